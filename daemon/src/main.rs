//! Periscope sampling daemon
//!
//! Long-lived server process that materializes client-described measurement
//! probes and runs sampling sessions on their behalf. Runs privileged so
//! that probe constructors needing elevated rights (hardware counters and
//! the like) work while clients stay unprivileged.

use anyhow::Result;
use clap::Parser;
use periscope_daemon::{Config, Server};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "periscope-daemon")]
#[command(about = "Remote sampling daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Port to listen on (loopback only)
    #[arg(short, long)]
    port: Option<u16>,

    /// Full listen address, overriding --port
    #[arg(long)]
    listen: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().map_err(|e| anyhow::anyhow!(e))?;

    let args = Args::parse();

    init_tracing(args.verbose);

    info!("Starting Periscope sampling daemon");

    let mut config = Config::default();
    if let Some(port) = args.port {
        config = Config::with_port(port);
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    // Privileged probe constructors (hardware counters etc.) need root
    if !nix::unistd::Uid::effective().is_root() {
        warn!("Not running as root; privileged probe constructors may fail.");
        warn!("Try: sudo {}", std::env::current_exe()?.display());
    }

    let server = Server::bind(config).await?;
    server.run().await
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
