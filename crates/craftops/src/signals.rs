//! Signal handling for graceful cancellation.
//!
//! A termination signal cancels the root [`CancellationToken`]; every
//! in-flight engine operation observes it and unwinds, removing partial
//! files on the way out.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits for a termination signal.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

/// Spawns a task that cancels `token` on the first termination signal.
///
/// The task ends quietly if the token is cancelled by other means first.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_shutdown_signal() => match result {
                Ok(()) => {
                    info!("Cancelling in-flight operations");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "Signal handling unavailable"),
            },
            _ = token.cancelled() => {}
        }
    })
}
