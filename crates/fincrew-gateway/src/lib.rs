//! Fincrew Gateway - HTTP surface for document analysis jobs

pub mod routes;
pub mod server;

pub use routes::{AnalyzeResponse, ApiError, StatusResponse};
pub use server::{build_router, start_gateway, AppState, MAX_UPLOAD_BYTES};
