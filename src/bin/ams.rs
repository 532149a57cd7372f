//! AMS client - polls the data server and prints memory-entitlement samples
//!
//! # Usage
//!
//! ```text
//! ams                            # all data from localhost, once a second, forever
//! ams --host lpar7 --system-only # system metrics only
//! ams --samples 10 --json        # ten JSON lines, then exit
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ams_client::{ClientConfig, DataClient, Sample, Sampler, DEFAULT_HOST, DEFAULT_PORT};
use ams_protocol::Command;

// ============================================================================
// CLI Arguments
// ============================================================================

/// AMS client - memory-entitlement sampler
#[derive(Parser, Debug)]
#[command(name = "ams", version, about)]
struct Args {
    /// Data server host
    #[arg(short = 'H', long, env = "AMS_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Data server port
    #[arg(short, long, env = "AMS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Request system metrics only, without bus and device data
    #[arg(short, long)]
    system_only: bool,

    /// Milliseconds between samples
    #[arg(short, long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Number of samples to take (0 polls until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    samples: u64,

    /// Print each sample as one JSON object per line
    #[arg(long)]
    json: bool,
}

impl Args {
    fn command(&self) -> Command {
        if self.system_only {
            Command::GetSysData
        } else {
            Command::GetAllData
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_sample(sample: &Sample, json: bool) {
    if let Some(message) = sample.response.error_message() {
        eprintln!("{}: {message}", sample.taken_at.format("%H:%M:%S"));
        return;
    }

    if json {
        match sample.to_json() {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Failed to encode sample: {e}"),
        }
    } else {
        println!("{}", sample.summary());
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ams_client=info".parse()?)
                .add_directive("ams_protocol=info".parse()?),
        )
        .init();

    let config = ClientConfig {
        host: args.host.clone(),
        port: args.port,
        ..Default::default()
    };
    debug!(config = ?config, command = %args.command(), "Client configuration");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            shutdown_token.cancel();
        }
    });

    let sampler = Sampler::new(
        DataClient::new(config),
        args.command(),
        Duration::from_millis(args.interval),
    );

    let json = args.json;
    let taken = sampler
        .run(args.samples, &cancel_token, |sample| print_sample(sample, json))
        .await
        .with_context(|| format!("Request to {}:{} failed", args.host, args.port))?;

    debug!(taken, "Sampling finished");
    Ok(())
}
