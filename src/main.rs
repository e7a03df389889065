//! burstfsd - BurstFS storage daemon
//!
//! Serves one daemon's metadata store and chunk storage over TCP.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burstfs::config::BurstConfig;
use burstfs::daemon::{Daemon, DaemonServer};
use burstfs::error::Result;

/// BurstFS storage daemon
#[derive(Parser)]
#[command(name = "burstfsd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "burstfs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start,

    /// Write a configuration file with defaults
    Init {
        /// Output path
        #[arg(short, long, default_value = "burstfs.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(short, long, default_value = "daemon-0")]
        node_id: String,
    },

    /// Validate the configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format = BurstConfig::from_file(&cli.config)
        .map(|c| c.logging.format)
        .unwrap_or_else(|_| "pretty".to_string());
    init_logging(&cli.log_level, &log_format);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the daemon and serve until Ctrl+C
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting BurstFS daemon...");

    let config = match BurstConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };

    tracing::info!("Node ID: {}", config.node.id);
    tracing::info!("Data directory: {}", config.node.data_dir.display());
    tracing::info!(
        "Cluster: {} daemons, {} replicas, {:?} metadata",
        config.num_daemons(),
        config.cluster.replicas,
        config.metadata.backend
    );

    let daemon = Arc::new(Daemon::from_config(&config)?);
    let server = DaemonServer::new(
        config.node.bind_address.clone(),
        daemon,
        config.transport.compression,
    );
    let listener = server.bind().await?;

    tokio::select! {
        result = server.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Daemon server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            server.stop();
        }
    }

    tracing::info!("BurstFS daemon stopped");
    Ok(())
}

/// Write a default configuration
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(r#"# BurstFS Configuration
# Every daemon and client must share [cluster] and [layout].

[node]
id = "{node_id}"
bind_address = "0.0.0.0:7070"
data_dir = "/var/lib/burstfs/{node_id}"
# capacity_chunks = 0

[cluster]
daemons = ["127.0.0.1:7070"]
# daemons = ["node-1:7070", "node-2:7070", "node-3:7070"]
replicas = 0

[layout]
chunk_size = 524288
use_pfl = false
# [[layout.components]]
# start = 0
# stripe_size = 524288

[features]
symlinks = true
rename = true
create_check_parents = false
zero_buffer_before_read = false

[metadata]
backend = "sqlite"

[transport]
connect_timeout_ms = 2000
request_timeout_ms = 30000
compression = false

[client]
fd_base = 100000

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nList every daemon under [cluster] in the same order on all nodes.");
    println!("Then start with: burstfsd --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match BurstConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Daemons: {}", config.num_daemons());
            println!("  Replicas: {}", config.cluster.replicas);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = BurstConfig::from_file(&config_path)?;

    println!("BurstFS Node Information");
    println!("========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Bind Address:     {}", config.node.bind_address);
    println!("Data Directory:   {}", config.node.data_dir.display());
    println!("Metadata Backend: {:?}", config.metadata.backend);
    println!();
    println!("Cluster:");
    for (id, address) in config.cluster.daemons.iter().enumerate() {
        println!("  [{}] {}", id, address);
    }
    println!("  Replicas:       {}", config.cluster.replicas);
    println!();
    println!("Layout:");
    if config.layout.use_pfl {
        for component in &config.layout.components {
            println!("  from {:>12}  stripe {}", component.start, component.stripe_size);
        }
    } else {
        println!("  Chunk Size:     {}", config.layout.chunk_size);
    }

    Ok(())
}
