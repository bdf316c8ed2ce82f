use clap::Parser;
use helpers::{enable_logging, normalize_single_dash_flags, set_full_stacktrace_as_default, wait_for_shutdown_signal};

use std::{error::Error, path::PathBuf};

use crate::{
    config::{AppConfig, CliOverrides},
    resolution::DnsSocket,
};

mod config;
mod helpers;
mod resolution;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "prodoh - A DNS proxy that answers UDP queries with the help of DNS-over-HTTPS json api servers."
)]
struct Cli {
    /// Listen address. Format: IP:Port or :Port. [default: :5354]
    #[arg(short, long)]
    address: Option<String>,

    /// DoH json api url. Repeat to add fallbacks, tried in order.
    #[arg(short, long = "upstream")]
    upstream: Vec<String>,

    /// Upstream timeout in seconds. Zero or negative disables it. [default: 10]
    #[arg(short, long, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Show verbose output. [default: false]
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    /// Optional toml config file. Command line values win over it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl From<Cli> for CliOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            address: cli.address,
            upstreams: cli.upstream,
            timeout: cli.timeout,
            verbose: cli.verbose,
            config: cli.config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    set_full_stacktrace_as_default();
    let cli = Cli::parse_from(normalize_single_dash_flags(std::env::args()));

    // Validated before any socket is opened.
    let config = AppConfig::load(cli.into())?;

    enable_logging(config.verbose);
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    tracing::info!("Starting prodoh v{VERSION}");
    tracing::debug!("Configuration:\n{:?}", config);
    for upstream in config.upstreams.iter() {
        tracing::info!("Upstream {upstream}");
    }

    // Exit the main thread if anything panics
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Thread paniced. Stop main thread too.");
        orig_hook(panic_info);
        std::process::exit(1);
    }));

    let dns_socket = DnsSocket::new(&config).await?;
    let stop_handle = dns_socket.start_receive_loop();

    tracing::info!("Listening on {}. Waiting for Ctrl-C...", dns_socket.local_addr()?);

    wait_for_shutdown_signal().await;
    println!();
    tracing::info!("Got it! Exiting...");
    if stop_handle.send(()).is_err() {
        tracing::warn!("Receive loop already stopped.");
    }

    Ok(())
}
