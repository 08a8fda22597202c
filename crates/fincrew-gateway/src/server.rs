//! Gateway server: router assembly and startup

use crate::routes::{analyze_handler, health_handler, index_handler, status_handler};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use fincrew_core::FincrewConfig;
use fincrew_pipeline::JobManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Upper bound on an uploaded document.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct AppState {
    pub jobs: Arc<JobManager>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .route("/status/:job_id", get(status_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn start_gateway(config: &FincrewConfig, jobs: Arc<JobManager>) -> anyhow::Result<()> {
    let app = build_router(Arc::new(AppState { jobs }));

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind.to_addr(), config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {}", e))?;

    info!("Fincrew gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Model:        {} via {}", config.llm.model, config.llm.base_url);
    info!("  Data dir:     {}", config.pipeline.data_dir.display());
    info!("  Scheduling:   {:?}", config.pipeline.scheduling);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
