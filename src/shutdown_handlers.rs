use pacekeeper::shutdown::CancelSignal;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Fires `signal` on Ctrl+C or SIGTERM. The task also ends once `signal`
/// fires for any other reason.
pub fn setup_signal_shutdown_handler(signal_tx: &CancelSignal) -> tokio::task::JoinHandle<()> {
    let signal_tx = signal_tx.clone();
    tokio::spawn(async move {
        let mut listener = signal_tx.listener();

        #[cfg(unix)]
        let mut term_signal = match signal(SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                warn!("Failed to register SIGTERM handler: {}", err);
                None
            }
        };

        #[cfg(unix)]
        {
            tokio::select! {
                () = listener.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!("Failed to listen for Ctrl+C: {}", err);
                    }
                    info!("Interrupted, stopping");
                    signal_tx.fire();
                }
                () = async {
                    if let Some(signal) = term_signal.as_mut() {
                        drop(signal.recv().await);
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {
                    info!("Terminated, stopping");
                    signal_tx.fire();
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                () = listener.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!("Failed to listen for Ctrl+C: {}", err);
                    }
                    info!("Interrupted, stopping");
                    signal_tx.fire();
                }
            }
        }
    })
}
