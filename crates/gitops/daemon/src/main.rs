//! GitOps Daemon - keeps local resources in step with a version-controlled snapshot
//!
//! The daemon provides:
//! - Startup application of YAML datasource documents
//! - Periodic, checksum-gated reconciliation per resource kind
//! - Orphan cleanup for objects removed from the snapshot

use clap::Parser;
use gitops_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// GitOps Daemon CLI
#[derive(Parser)]
#[command(name = "gitopsd")]
#[command(about = "GitOps Daemon - provisioning reconciliation service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GITOPS_CONFIG")]
    config: Option<String>,

    /// Snapshot root directory
    #[arg(short, long, env = "GITOPS_SNAPSHOT_ROOT")]
    snapshot_root: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "GITOPS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "GITOPS_LOG_JSON")]
    json: bool,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(root) = cli.snapshot_root {
        config.snapshot.root = root;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        snapshot = %config.snapshot.root.display(),
        interval_secs = config.scheduler.interval_secs,
        "Starting GitOps daemon"
    );

    let server = Server::new(config).await?;
    if cli.once {
        server.run_once().await
    } else {
        server.run().await
    }
}
