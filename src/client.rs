//! One complete agency session: connect, submit every bet, ask for the
//! winners, close.

use crate::config::Config;
use crate::error::{BetSourceError, ClientError, Result, TransportError};
use crate::protocol::Bet;
use crate::shutdown::CancellationToken;
use crate::submitter::{BatchSubmitter, Progress};
use crate::transport::{self, Connection};
use tracing::{error, info};

/// What a session achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub bets_sent: u64,
    pub chunks: u64,
    pub winners: Vec<String>,
    pub cancelled: bool,
}

/// Run a session with the configured bet source.
pub fn run(config: &Config, cancel: CancellationToken) -> Result<SessionSummary> {
    let bets = config.bets.open()?;
    session(config, bets, cancel)
}

/// Run a session over a fresh connection to the configured aggregator.
pub fn session(
    config: &Config,
    bets: impl IntoIterator<Item = std::result::Result<Bet, BetSourceError>>,
    cancel: CancellationToken,
) -> Result<SessionSummary> {
    let conn = transport::connect(&config.server_address).map_err(|e| {
        error!(
            action = "connect",
            result = "fail",
            agency = %config.agency,
            address = %config.server_address,
            error = %e,
            "Connect failed"
        );
        TransportError::Io(e)
    })?;
    info!(
        action = "connect",
        result = "success",
        agency = %config.agency,
        address = %config.server_address,
        "Connected"
    );

    let submitter = BatchSubmitter::new(config.agency.clone(), conn, config.limits(), cancel);
    submit(submitter, bets)
}

/// Feed every bet through `submitter`, then query the winners.
///
/// The connection is closed on every path out of this function.
pub fn submit<C: Connection>(
    mut submitter: BatchSubmitter<C>,
    bets: impl IntoIterator<Item = std::result::Result<Bet, BetSourceError>>,
) -> Result<SessionSummary> {
    let completed = match submit_all(&mut submitter, bets) {
        Ok(completed) => completed,
        Err(e) => {
            submitter.close();
            return Err(e);
        }
    };

    let mut summary = SessionSummary {
        bets_sent: submitter.bets_sent(),
        chunks: submitter.chunks_sent(),
        winners: Vec::new(),
        cancelled: !completed,
    };
    if !completed {
        return Ok(summary);
    }

    summary.winners = submitter.into_winners_query()?.run()?;
    Ok(summary)
}

/// Returns `false` when the session was cancelled.
fn submit_all<C: Connection>(
    submitter: &mut BatchSubmitter<C>,
    bets: impl IntoIterator<Item = std::result::Result<Bet, BetSourceError>>,
) -> Result<bool> {
    for bet in bets {
        let bet = bet.map_err(ClientError::from)?;
        if submitter.add_record(&bet)? == Progress::Cancelled {
            return Ok(false);
        }
    }
    Ok(submitter.end_stream()? != Progress::Cancelled)
}
