//! Ephemeris control server binary.

use clap::Parser;
use ephemeris_control::{ControlConfig, ControlServer};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ephemeris cluster control plane.
#[derive(Parser, Debug)]
#[command(name = "ephemeris")]
#[command(about = "Run the Ephemeris control-plane server")]
#[command(version)]
struct Cli {
    /// TOML file layered over `ephemeris.toml`; `EPHEMERIS_*` variables
    /// still override it. The server refuses to start if it is missing or
    /// invalid.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Log at debug level, including failed sequencer commands.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,hyper=info,tower=info"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = ControlConfig::load(cli.config.as_deref()).inspect_err(|e| {
        error!(error = %e, "Invalid configuration, refusing to start");
    })?;

    info!(
        session = %config.session_name,
        listen_addr = %config.server.listen_addr,
        backend = ?config.storage,
        io_threads = config.server.io_threads,
        "Configuration loaded"
    );

    // Worker count comes from config.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.io_threads)
        .thread_name("ephemeris-io")
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: ControlConfig) -> anyhow::Result<()> {
    let mut server = ControlServer::new(config);
    server.start().await?;

    shutdown_signal().await;

    server.stop().await;
    info!("Ephemeris control server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, stopping control server");
        }
        () = terminate => {
            info!("Received SIGTERM, stopping control server");
        }
    }
}
