//! fincrew - multi-role financial document analysis service
//!
//! Usage:
//!   fincrew                          -> serve the HTTP API (same as `fincrew serve`)
//!   fincrew serve --port 8000        -> serve on a specific port
//!   fincrew analyze report.pdf       -> run the crew on a local file and print the memo
//!   fincrew config                   -> print the effective configuration as TOML
//!   fincrew version                  -> show version

use clap::{Parser, Subcommand};
use fincrew_core::{BindMode, FincrewConfig, JobStatus, SchedulingPolicy};
use fincrew_pipeline::{
    provider_from_config, FinancialPipeline, FsDocumentStore, JobManager, UploadedDocument,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "fincrew",
    about = "Financial document analysis with a crew of AI roles",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file (TOML)
    #[arg(short, long, global = true, default_value = "fincrew.toml")]
    config: PathBuf,

    /// Directory for uploaded documents while a job runs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run stages strictly one after another
    #[arg(long, global = true, default_value_t = false)]
    sequential: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Bind mode: lan or loopback
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Analyze a local document without the HTTP layer
    Analyze {
        file: PathBuf,
        #[arg(short, long)]
        query: Option<String>,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 1800)]
        timeout: u64,
    },
    /// Print the effective configuration
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Version) => {
            println!("fincrew v{}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Config) => {
            print!("{}", load_config(&cli).to_toml());
        }
        Some(Commands::Analyze { file, query, timeout }) => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            let config = load_config(&cli);
            analyze(&config, file, query.as_deref(), Duration::from_secs(*timeout)).await?;
        }
        Some(Commands::Serve { port, bind }) => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            let mut config = load_config(&cli);
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(bind) = bind {
                config.server.bind = BindMode::parse(bind);
            }
            serve(config).await?;
        }
        None => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            serve(load_config(&cli)).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "fincrew=info,tower_http=info".into())
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file must name a file"))?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();
    Ok(guard)
}

/// File, then environment, then command-line flags.
fn load_config(cli: &Cli) -> FincrewConfig {
    let mut config = FincrewConfig::load(&cli.config).with_env();
    if let Some(dir) = &cli.data_dir {
        config.pipeline.data_dir = dir.clone();
    }
    if cli.sequential {
        config.pipeline.scheduling = SchedulingPolicy::Sequential;
    }
    config
}

fn job_manager(config: &FincrewConfig) -> anyhow::Result<JobManager> {
    let provider = provider_from_config(&config.llm)?;
    let pipeline = FinancialPipeline::from_config(provider, config)?;
    let store = FsDocumentStore::new(&config.pipeline.data_dir);
    Ok(JobManager::new(Arc::new(pipeline), Arc::new(store))
        .with_default_query(config.pipeline.default_query.clone()))
}

async fn serve(config: FincrewConfig) -> anyhow::Result<()> {
    let jobs = Arc::new(job_manager(&config)?);
    fincrew_gateway::start_gateway(&config, jobs).await
}

async fn analyze(
    config: &FincrewConfig,
    file: &Path,
    query: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", file.display(), e))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".into());

    let jobs = job_manager(config)?;
    let submission = jobs.submit(UploadedDocument::new(file_name, bytes), query).await?;
    tracing::info!(job_id = %submission.job_id, query = %submission.query, "analysis started");

    let snapshot = jobs.wait_for(submission.job_id.as_str(), timeout).await?;
    for (stage, text) in snapshot.ordered_stages() {
        println!("=== {} ===\n{}\n", stage, text);
    }

    match snapshot.status {
        JobStatus::Completed => {
            println!("=== memo ===\n{}", snapshot.result.unwrap_or_default());
            Ok(())
        }
        _ => Err(anyhow::anyhow!(
            "analysis failed: {}",
            snapshot.error.unwrap_or_else(|| "unknown error".into())
        )),
    }
}
