//! Workbench host daemon binary
//!
//! Launches the configured worker processes, supervises them, and tears
//! everything down on Ctrl+C.

#![allow(unused_crate_dependencies)]

use arcturus_core::shutdown;
use arcturus_core::supervisor::UnixWorkerAdapter;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Workbench host daemon: launches and supervises worker processes
#[derive(Debug, Parser)]
#[command(name = "arcturus-hostd", version, about)]
struct Cli {
    /// Path to the workers TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> hostd::Result<()> {
    let cli = Cli::parse();

    arcturus_core::utils::init_tracing(&cli.log_level)
        .map_err(|e| hostd::HostdError::StartupError(e.to_string()))?;

    info!("Starting workbench host daemon");

    let adapter = Arc::new(UnixWorkerAdapter::new());
    let handle = hostd::bootstrap(cli.config, adapter).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    // Kill anything still alive, then release the supervisors
    shutdown::run_shutdown_hooks();
    handle.shutdown().await;

    info!("Daemon stopped");
    Ok(())
}
