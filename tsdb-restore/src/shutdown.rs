//! Cancellation of a running restore on SIGTERM and SIGINT.
//!
//! The restore in flight finishes its current server call, then stops at the
//! next step boundary with a cancellation error.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels a token when the process is asked to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by the restore run.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGTERM or SIGINT, then cancel the token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
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
                info!("Received SIGINT (Ctrl+C), stopping after the current step...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping after the current step...");
            }
            _ = self.token.cancelled() => return,
        }

        self.token.cancel();
    }

    /// Cancel without a signal.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
