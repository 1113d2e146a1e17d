//! Process signals and shutdown ordering
//!
//! One listener turns SIGINT/SIGTERM into cancellation of the root token;
//! components never install handlers of their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolves on the first Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

/// Cancel `cancel` when a termination signal arrives
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    })
}

/// Lets a shutdown sequence run exactly once
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    fired: Arc<AtomicBool>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only
    pub fn begin(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_fires_once_across_clones() {
        let latch = ShutdownLatch::new();
        let other = latch.clone();
        assert!(!latch.is_fired());
        assert!(other.begin());
        assert!(!latch.begin());
        assert!(!other.begin());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn test_signal_listener_exits_when_already_cancelled() {
        let cancel = CancellationToken::new();
        let listener = spawn_signal_listener(cancel.clone());
        cancel.cancel();
        listener.await.unwrap();
    }
}
