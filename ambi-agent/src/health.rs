//! Liveness heartbeat
//!
//! Overwrites a well-known file with the current Unix timestamp at startup
//! and then on every interval, so an external watchdog can check freshness.
//! Write failures are ignored.

use ambi_common::time::unix_timestamp;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Heartbeat {
    path: PathBuf,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current timestamp once
    pub async fn beat(&self) {
        let stamp = format!("{}\n", unix_timestamp());
        if let Err(e) = tokio::fs::write(&self.path, stamp).await {
            trace!("Heartbeat write to {} failed: {}", self.path.display(), e);
        }
    }

    /// Beat now and on every interval until cancelled
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(
                "Heartbeat every {:?} to {}",
                self.interval,
                self.path.display()
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.beat().await,
                }
            }
        })
    }
}
