//! agency-client binary: loads configuration, sets up logging and signal
//! handling, then runs one submission session.

use agency_client::client;
use agency_client::config::Config;
use agency_client::shutdown::{self, CancellationToken};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        agency = %config.agency,
        server = %config.server_address,
        max_chunk_bytes = config.max_chunk_bytes,
        max_segment_bytes = config.max_segment_bytes,
        bets = ?config.bets,
        "Starting agency client"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

/// Run the blocking session while signals are watched on the runtime.
async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    shutdown::spawn_signal_listener(cancel.clone())?;

    let agency = config.agency.clone();
    let outcome = tokio::task::spawn_blocking(move || client::run(&config, cancel)).await?;

    match outcome {
        Ok(summary) if summary.cancelled => {
            info!(agency = %agency, bets = summary.bets_sent, "Session cancelled");
            Ok(())
        }
        Ok(summary) => {
            info!(
                agency = %agency,
                bets = summary.bets_sent,
                chunks = summary.chunks,
                winners = summary.winners.len(),
                "Session finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(agency = %agency, error = %e, "Session failed");
            Err(e.into())
        }
    }
}
