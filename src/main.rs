//! GeoCluster - catalog and configuration replication node
//!
//! Usage:
//!   geocluster [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>        Settings file path (TOML)
//!   -C, --config-dir <DIR>     Directory holding cluster.properties
//!   -d, --data-dir <DIR>       Data directory holding style documents
//!   -l, --log-level <LEVEL>    Log level (error, warn, info, debug, trace)
//!   -h, --help                 Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use geocluster::catalog::{DataDirectory, MemoryCatalog, MemorySettings};
use geocluster::config::{ClusterConfiguration, Config, INSTANCE_NAME_KEY};
use geocluster::node::{ClusterNode, NodeStores};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// GeoCluster - replicate catalog changes between map server instances
#[derive(Parser, Debug)]
#[command(name = "geocluster")]
#[command(author = "GeoCluster Contributors")]
#[command(version)]
#[command(about = "Catalog and configuration replication node")]
struct Args {
    /// Settings file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding cluster.properties
    #[arg(short = 'C', long)]
    config_dir: Option<PathBuf>,

    /// Data directory holding style documents
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Settings file if given, environment overrides either way
    let file_config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let file_config = match file_config {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config file: {}", e);
            std::process::exit(1);
        }
    };

    // CLI overrides config, config overrides default (info)
    let log_level = args.log_level.unwrap_or_else(|| {
        match file_config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let config_dir = args.config_dir.unwrap_or(file_config.node.config_dir);
    let data_dir = args.data_dir.unwrap_or(file_config.node.data_dir);

    let cluster_config = Arc::new(ClusterConfiguration::with_standard_extensions(Some(
        config_dir.clone(),
    ))?);
    cluster_config.init();

    info!("Starting GeoCluster node");
    info!(
        "  Instance: {}",
        cluster_config.get(INSTANCE_NAME_KEY).unwrap_or_default()
    );
    info!("  Group: {}", cluster_config.group());
    info!("  Broker: {}", cluster_config.broker_url());
    info!("  Topic: {}", cluster_config.topic_name());
    info!("  Config dir: {}", config_dir.display());
    info!("  Data dir: {}", data_dir.display());

    let data_dir = Arc::new(DataDirectory::new(data_dir));
    let stores = NodeStores {
        catalog: Arc::new(MemoryCatalog::with_data_dir(data_dir.clone())),
        settings: Arc::new(MemorySettings::new()),
        data_dir,
    };

    let node = ClusterNode::new(
        cluster_config,
        stores,
        file_config.timeouts.clone(),
        file_config.node.consumer_queue,
    );
    if let Err(e) = node.start().await {
        error!("Failed to start cluster node: {}", e);
        std::process::exit(1);
    }
    info!(
        "  Embedded broker: {}",
        if node.is_embedded_broker_started() { "running" } else { "not running" }
    );
    info!(
        "  Connection: {}",
        if node.is_connected() { "connected" } else { "disconnected" }
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    node.shutdown().await;

    Ok(())
}
