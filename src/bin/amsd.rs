//! AMS data server
//!
//! Serves the partition's memory-entitlement metrics to `ams` clients.
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces, port 50000
//! amsd
//!
//! # Another port, reading a captured sysfs tree
//! amsd --port 6000 --root /tmp/lpar-snapshot
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ams_core::SysfsProvider;
use amsd::{CommandRegistry, DataServer, ServerConfig, DEFAULT_PORT};

/// AMS data server - answers memory-entitlement metric requests
#[derive(Parser, Debug)]
#[command(name = "amsd", version, about)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, env = "AMS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Filesystem root holding /proc and /sys
    #[arg(short, long, env = "AMS_ROOT", default_value = "/")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("amsd=info".parse()?)
                .add_directive("ams_core=info".parse()?)
                .add_directive("ams_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        root = %args.root.display(),
        "AMS data server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let provider = Arc::new(SysfsProvider::with_root(args.root.clone()));
    let registry = CommandRegistry::new(provider);

    let config = ServerConfig {
        bind_addr: SocketAddr::new(args.bind, args.port),
        ..Default::default()
    };
    let server = DataServer::bind(config, registry, cancel_token)
        .context("Failed to start data server")?;

    server.run().await.context("Data server stopped")?;

    info!("AMS data server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
