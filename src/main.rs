use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use batch_analysis::batch_analysis::{
    AnalysisAuditStore, AnalysisError, AnalysisRequest, BatchAnalysisService, HttpRemoteAnalyzer,
    RemoteAnalyzer, SqliteAuditStore, SubmitOutcome, DEFAULT_LINK_MODE,
};
use batch_analysis::config;
use batch_analysis::content_store::{ContentStore, ItemId, NewContentItem, SqliteContentStore};
use batch_analysis::metrics;
use batch_analysis::task_scheduler::{InMemoryTaskScheduler, TickRunner};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (content.db, analysis_audit.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Base URL of the remote analysis service.
    #[clap(long)]
    pub analysis_url: Option<String>,

    /// Bearer token for the analysis service.
    #[clap(long)]
    pub api_key: Option<String>,

    /// Timeout in seconds for analysis service requests.
    #[clap(long, default_value_t = 60)]
    pub request_timeout_sec: u64,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9092)]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analysis daemon until interrupted.
    Run,

    /// Queue items for analysis.
    Enqueue {
        #[clap(required = true)]
        ids: Vec<ItemId>,

        /// How the analysis service should render discovered links.
        #[clap(long, default_value = DEFAULT_LINK_MODE)]
        link_mode: String,
    },

    /// Queue every published item that was never analyzed.
    AutoSelect,

    /// Run a single processing tick.
    Tick,

    /// Shows the job record of an item.
    Status { id: ItemId },

    /// Shows both waiting queues.
    Queues,

    /// Shows the recorded state transitions of an item.
    History { id: ItemId },

    /// Imports content items from a JSON array.
    Import {
        #[clap(value_parser = parse_path)]
        path: PathBuf,
    },
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            analysis_url: args.analysis_url.clone(),
            api_key: args.api_key.clone(),
            request_timeout_sec: args.request_timeout_sec,
            metrics_port: args.metrics_port,
        }
    }
}

/// Stands in for the remote service in commands that never reach it.
struct UnconfiguredAnalyzer;

#[async_trait]
impl RemoteAnalyzer for UnconfiguredAnalyzer {
    async fn submit(&self, _request: &AnalysisRequest) -> Result<SubmitOutcome, AnalysisError> {
        Err(AnalysisError::Transport(
            "analysis_url is not configured".to_string(),
        ))
    }

    async fn fetch_result(&self, _token: &str) -> Result<String, AnalysisError> {
        Err(AnalysisError::Transport(
            "analysis_url is not configured".to_string(),
        ))
    }
}

fn build_remote(app_config: &config::AppConfig, required: bool) -> Result<Arc<dyn RemoteAnalyzer>> {
    match &app_config.analysis_url {
        Some(url) => {
            info!("Analysis service configured at {}", url);
            Ok(Arc::new(HttpRemoteAnalyzer::new(
                url.clone(),
                app_config.api_key.clone(),
                app_config.request_timeout_sec,
            )?))
        }
        None if required => {
            bail!("analysis_url must be specified via --analysis-url or in config file")
        }
        None => Ok(Arc::new(UnconfiguredAnalyzer)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    let content_store = Arc::new(SqliteContentStore::new(app_config.content_db_path())?);
    let audit_store: Arc<dyn AnalysisAuditStore> =
        Arc::new(SqliteAuditStore::new(app_config.audit_db_path())?);
    let scheduler = Arc::new(InMemoryTaskScheduler::new());

    let needs_remote = matches!(cli_args.command, Command::Run | Command::Tick);
    let remote = build_remote(&app_config, needs_remote)?;

    let service = Arc::new(BatchAnalysisService::new(
        content_store.clone(),
        remote,
        scheduler.clone(),
        audit_store,
        &app_config.batch_analysis,
    ));

    match cli_args.command {
        Command::Run => run_daemon(&app_config, scheduler, service).await,
        Command::Enqueue { ids, link_mode } => {
            let count = service.enqueue_for_analysis(&ids, &link_mode)?;
            info!("Queued {} items (links: {})", count, link_mode);
            Ok(())
        }
        Command::AutoSelect => {
            let count = service.submit_auto_selected_posts()?;
            println!("{}", count);
            Ok(())
        }
        Command::Tick => print_json(&service.batch_analyze().await?),
        Command::Status { id } => match service.get_job(id)? {
            Some(job) => print_json(&job),
            None => bail!("Item {} is not tracked", id),
        },
        Command::Queues => print_json(&serde_json::json!({
            "waiting_for_analysis": service.waiting_for_analysis()?.into_values().collect::<Vec<_>>(),
            "waiting_for_response": service.waiting_for_response()?.into_values().collect::<Vec<_>>(),
        })),
        Command::History { id } => print_json(&service.history(id)?),
        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let items: Vec<NewContentItem> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                ids.push(content_store.insert_item(item)?);
            }
            info!("Imported {} items", ids.len());
            print_json(&ids)
        }
    }
}

async fn run_daemon(
    app_config: &config::AppConfig,
    scheduler: Arc<InMemoryTaskScheduler>,
    service: Arc<BatchAnalysisService>,
) -> Result<()> {
    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  backoff: {}s", app_config.batch_analysis.backoff_secs);
    info!("  max_attempts: {}", app_config.batch_analysis.max_attempts);
    info!("  concurrency: {}", app_config.batch_analysis.concurrency);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();
    if app_config.metrics_port != 0 {
        let port = app_config.metrics_port;
        let token = shutdown_token.child_token();
        tokio::spawn(async move {
            if let Err(e) = metrics::run_metrics_server(port, token).await {
                tracing::error!("Metrics server failed: {:#}", e);
            }
        });
    }

    let runner = TickRunner::new(
        scheduler,
        service,
        Duration::from_secs(app_config.batch_analysis.rescan_interval_secs.max(1)),
        shutdown_token.child_token(),
    );

    tokio::select! {
        _ = runner.run() => {
            info!("Tick runner stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the metrics server a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    Ok(())
}
