//! Process entry point for the vitals simulator.
//!
//! Takes no arguments; everything is read from the environment (and a `.env`
//! file, if present).

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vitals_simulator::{Config, KafkaSink, Publisher, VitalsGenerator};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);

    let sink = KafkaSink::new(&config)?;
    let delivery = sink.stats();

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let mut publisher = Publisher::new(&config, sink, VitalsGenerator::from_entropy());
    let stats = match config.max_cycles {
        Some(cycles) => publisher.run_cycles(cycles, shutdown).await?,
        None => publisher.run(shutdown).await?,
    };

    info!(
        "Done: {} cycles, {} records sent, {} delivered, {} failed",
        stats.cycles,
        stats.records_sent,
        delivery.delivered(),
        delivery.failed()
    );

    Ok(())
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("SIGINT received, finishing current cycle and shutting down...");
        }
        _ = terminate => {
            info!("SIGTERM received, finishing current cycle and shutting down...");
        }
    }

    shutdown.cancel();
}
