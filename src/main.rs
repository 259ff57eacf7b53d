use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bulk_manager_server::config;
use bulk_manager_server::jobs::{JobService, SqliteJobStore};
use bulk_manager_server::queue::{JobEvents, SqliteJobQueue};
use bulk_manager_server::schedules::{EvaluatorHandle, ScheduleEvaluator, SqliteScheduleStore};
use bulk_manager_server::server::{metrics, run_server, RequestsLoggingLevel};
use bulk_manager_server::tenants::SqliteTenantStore;
use bulk_manager_server::uploads::UploadStore;
use bulk_manager_server::{ServerComponents, ServerConfig};

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

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the jobs, schedules, queue and tenants databases.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Shopify app secret used to verify session tokens.
    #[clap(long, env = "SHOPIFY_API_SECRET", hide_env_values = true)]
    pub shopify_api_secret: Option<String>,

    /// Secret of the operator portal's admin tokens. Admin routes are
    /// unusable without it.
    #[clap(long, env = "ADMIN_JWT_SECRET", hide_env_values = true)]
    pub admin_jwt_secret: Option<String>,

    /// Bearer token expected on worker routes. Worker routes are not
    /// mounted without it.
    #[clap(long, env = "WORKER_TOKEN", hide_env_values = true)]
    pub worker_token: Option<String>,

    /// Where uploaded import files are stored. Defaults to `<db-dir>/uploads`.
    #[clap(long, value_parser = parse_path)]
    pub upload_dir: Option<PathBuf>,

    /// Seconds between two schedule evaluation passes.
    #[clap(long, default_value_t = config::DEFAULT_EVALUATION_INTERVAL_SECS)]
    pub evaluation_interval_secs: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            shopify_api_secret: args.shopify_api_secret.clone(),
            admin_jwt_secret: args.admin_jwt_secret.clone(),
            worker_token: args.worker_token.clone(),
            upload_dir: args.upload_dir.clone(),
            evaluation_interval_secs: args.evaluation_interval_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

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

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  uploads: {:?}", app_config.uploads.dir);
    info!("  scheduler: {:?}", app_config.scheduler);

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening job store at {:?}...", app_config.jobs_db_path());
    let job_store = Arc::new(SqliteJobStore::new(app_config.jobs_db_path())?);
    info!(
        "Opening schedule store at {:?}...",
        app_config.schedules_db_path()
    );
    let schedule_store = Arc::new(SqliteScheduleStore::new(app_config.schedules_db_path())?);
    info!("Opening queue at {:?}...", app_config.queue_db_path());
    let job_events = JobEvents::new();
    let queue = Arc::new(SqliteJobQueue::new(
        app_config.queue_db_path(),
        job_events.clone(),
    )?);
    let tenant_store = Arc::new(SqliteTenantStore::new(app_config.tenants_db_path())?);
    let uploads = Arc::new(UploadStore::new(&app_config.uploads.dir)?);

    // Close the gap left by a crash between persisting and publishing a job.
    let job_service = JobService::new(job_store.clone(), schedule_store.clone(), queue.clone());
    match job_service.reconcile_orphans().await {
        Ok(count) => info!("Startup reconciliation re-published {} jobs", count),
        Err(e) => error!("Startup reconciliation failed: {}", e),
    }

    let shutdown_token = CancellationToken::new();

    let (evaluator_handle, evaluator_task) = if app_config.scheduler.enabled {
        let (handle, command_rx) = EvaluatorHandle::channel();
        let evaluator = ScheduleEvaluator::new(
            job_store.clone(),
            schedule_store.clone(),
            queue.clone(),
            app_config.scheduler.lease_ttl(),
        );
        let task = tokio::spawn(evaluator.run(
            app_config.scheduler.evaluation_interval(),
            command_rx,
            shutdown_token.clone(),
        ));
        (Some(handle), Some(task))
    } else {
        info!("Schedule evaluator disabled");
        (None, None)
    };

    let components = ServerComponents {
        job_store,
        schedule_store,
        tenant_store,
        queue: queue.clone(),
        queue_consumer: queue,
        job_events,
        uploads,
        evaluator: evaluator_handle,
    };
    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        shopify_api_secret: app_config.auth.shopify_api_secret.clone(),
        admin_jwt_secret: app_config.auth.admin_jwt_secret.clone(),
        worker_token: app_config.auth.worker_token.clone(),
        upload_max_bytes: app_config.uploads.max_bytes,
    };

    info!("Ready to serve at port {}!", app_config.port);

    let result = tokio::select! {
        result = run_server(
            server_config,
            app_config.metrics_port,
            components,
            shutdown_token.clone(),
        ) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    if let Some(task) = evaluator_task {
        // Let an in-flight pass finish and release its lease.
        if tokio::time::timeout(Duration::from_secs(10), task).await.is_err() {
            error!("Schedule evaluator did not stop in time");
        }
    }
    result
}
