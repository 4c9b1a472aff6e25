//! Ctrl+C and SIGTERM handling
//!
//! A signal is turned into a message on a broadcast channel; the download
//! manager subscribes to it and stops handing out new tasks.

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Broadcasts shutdown when the process is interrupted
#[derive(Debug, Clone)]
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<()>,
}

impl SignalHandler {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown without a signal
    pub fn trigger(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Spawn the task that waits for a signal
    ///
    /// A handler that cannot be installed is logged and never fires.
    pub fn setup(&self) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Could not install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Could not install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, finishing transfers in flight"),
                _ = terminate => info!("Received terminate signal, finishing transfers in flight"),
            }

            let _ = shutdown_tx.send(());
        })
    }
}

/// Sender and first receiver of a shutdown broadcast
pub fn create_shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}
