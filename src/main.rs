//! hpipe - Entry Point
//!
//! Tunnels TCP over HTTP in one of three roles chosen from the arguments.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use hpipe::metrics::METRICS;
use hpipe::{Config, Role, VERSION};

/// Tunnel a TCP byte stream over an HTTP(S) connection
#[derive(Parser)]
#[command(name = "hpipe")]
#[command(disable_version_flag = true)]
#[command(override_usage = "\
  (HTTP->TCP)   hpipe -l [address]:port [host]:port
  (TCP->HTTP)   hpipe -l [address]:port URL
  (stdio->HTTP) hpipe URL")]
struct Cli {
    /// Listen address
    #[arg(short = 'l', value_name = "ADDRESS")]
    listen: Option<String>,

    /// Path to an optional TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show version and exit
    #[arg(short = 'v')]
    version: bool,

    /// `host:port` of the TCP target, or URL of the tunnel endpoint
    target: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("hpipe {}", VERSION);
        return Ok(());
    }
    let Some(target) = cli.target else {
        Cli::command()
            .error(ErrorKind::MissingRequiredArgument, "a target is required")
            .exit();
    };

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    hpipe::util::init_tracing(&config.logging)?;

    let role = Role::from_args(cli.listen.as_deref(), &target);
    info!(version = VERSION, role = role.name(), "Starting hpipe");

    let tunnel = Arc::new(config.tunnel);

    tokio::select! {
        result = role.run(tunnel) => {
            if let Err(e) = result {
                error!(error = %e, "hpipe failed");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    let snapshot = METRICS.snapshot();
    info!(
        tunnels = snapshot.tunnels_total,
        active = snapshot.tunnels_active,
        failed = snapshot.tunnels_failed,
        timeouts = snapshot.timeouts_total,
        up_bytes = snapshot.bytes_up,
        down_bytes = snapshot.bytes_down,
        health_checks = snapshot.health_checks,
        rejected = snapshot.requests_rejected,
        "hpipe stopped"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
