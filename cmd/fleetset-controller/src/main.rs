use clap::Parser;
use pkg_constants::controller::{
    DEFAULT_BACKOFF_BASE_MILLIS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_OPERATION_CONCURRENCY,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKERS,
};
use pkg_constants::paths::{DEFAULT_CONTROLLER_CONFIG, DEFAULT_DATA_DIR};
use pkg_controllers::control::StorePodControl;
use pkg_controllers::daemonset::{ControllerConfig, DaemonSetController};
use pkg_state::cache::ClusterCache;
use pkg_state::client::StateStore;
use pkg_state::informer::Informer;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetset-controller", about = "DaemonSet placement controller")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of sync workers
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds between full resyncs of every DaemonSet; 0 disables them
    #[arg(long)]
    resync_interval_secs: Option<u64>,

    /// Max pod create/delete calls in flight per sync
    #[arg(long)]
    operation_concurrency: Option<usize>,

    /// First retry delay for a failing DaemonSet, in milliseconds
    #[arg(long)]
    backoff_base_millis: Option<u64>,

    /// Retry delay ceiling, in seconds
    #[arg(long)]
    backoff_max_secs: Option<u64>,

    /// Log format: "text" or "json"
    #[arg(long)]
    log_format: Option<String>,
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let log_format = cli
        .log_format
        .or(file_cfg.log_format)
        .unwrap_or_else(|| "text".to_string());
    init_tracing(&log_format);
    info!("Config file: {}", cli.config);

    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let config = ControllerConfig {
        workers: cli.workers.or(file_cfg.workers).unwrap_or(DEFAULT_WORKERS),
        resync_interval: Duration::from_secs(
            cli.resync_interval_secs
                .or(file_cfg.resync_interval_secs)
                .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
        ),
        operation_concurrency: cli
            .operation_concurrency
            .or(file_cfg.operation_concurrency)
            .unwrap_or(DEFAULT_OPERATION_CONCURRENCY),
        backoff_base: Duration::from_millis(
            cli.backoff_base_millis
                .or(file_cfg.backoff_base_millis)
                .unwrap_or(DEFAULT_BACKOFF_BASE_MILLIS),
        ),
        backoff_max: Duration::from_secs(
            cli.backoff_max_secs
                .or(file_cfg.backoff_max_secs)
                .unwrap_or(DEFAULT_BACKOFF_MAX_SECS),
        ),
    };

    info!("Starting fleetset-controller");
    info!("  Data dir:    {}", data_dir);
    info!("  Workers:     {}", config.workers);
    info!("  Resync:      {}s", config.resync_interval.as_secs());
    info!("  Concurrency: {}", config.operation_concurrency);

    let store = StateStore::new(&data_dir).await?;
    let cache = Arc::new(ClusterCache::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Subscribe before the informer starts filling the cache
    let cache_events = cache.subscribe();
    let informer = Informer::new(store.clone(), cache.clone()).start(shutdown_rx.clone());

    let controller = Arc::new(DaemonSetController::new(
        cache.clone(),
        cache.clone(),
        cache.clone(),
        Arc::new(StorePodControl::new(store.clone())),
        config,
    ));
    let controller_task = tokio::spawn(controller.run(cache_events, shutdown_rx));

    // Block until Ctrl-C
    tokio::signal::ctrl_c().await?;
    info!("Shutting down fleetset-controller");
    let _ = shutdown_tx.send(true);

    if let Err(e) = controller_task.await {
        warn!("Controller task failed: {}", e);
    }
    if let Err(e) = informer.await {
        warn!("Informer task failed: {}", e);
    }
    store.close().await?;

    Ok(())
}
