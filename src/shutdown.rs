//! Cooperative cancellation.
//!
//! The session polls a `CancellationToken` at the start of every batch
//! operation and never mid-transfer. Process signals are bridged onto the
//! token by a small tokio task.

pub use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn a task that cancels `token` on SIGTERM or ctrl-c.
///
/// The task exits without cancelling if the token is cancelled elsewhere
/// first. Must be called from within a tokio runtime.
pub fn spawn_signal_listener(token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sigterm.recv() => info!("SIGTERM received, cancelling session"),
                _ = tokio::signal::ctrl_c() => info!("Interrupt received, cancelling session"),
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, cancelling session");
                    token.cancel();
                }
            }
        });
    }

    Ok(())
}
