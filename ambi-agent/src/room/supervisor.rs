//! Connection supervisor
//!
//! Owns the room connection for the lifetime of the service. Each iteration
//! mints a fresh credential, joins, publishes the audio track, seeds presence
//! from the membership snapshot and then dispatches room events until the
//! connection drops. Failures are retried with capped exponential backoff;
//! only configuration errors and cancellation end the loop.

use super::{
    ConnectionState, CredentialIssuer, JoinOptions, PresenceChange, PresenceTracker,
    RoomConnector, RoomEvent, RoomHandle, RoomSession,
};
use crate::audio::types::FrameFormat;
use crate::error::Result;
use crate::lifecycle::ShutdownLatch;
use crate::playback::PublishLoop;
use ambi_common::Backoff;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a connected session ended
enum SessionEnd {
    Lost(String),
    Cancelled,
}

pub struct Supervisor {
    connector: Arc<dyn RoomConnector>,
    issuer: Arc<dyn CredentialIssuer>,
    publisher: PublishLoop,
    presence: PresenceTracker,
    backoff: Backoff,
    join: JoinOptions,
    format: FrameFormat,
    active: Option<Box<dyn RoomHandle>>,
    state_tx: watch::Sender<ConnectionState>,
    latch: ShutdownLatch,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn RoomConnector>,
        issuer: Arc<dyn CredentialIssuer>,
        publisher: PublishLoop,
        presence: PresenceTracker,
        backoff: Backoff,
        join: JoinOptions,
        format: FrameFormat,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            issuer,
            publisher,
            presence,
            backoff,
            join,
            format,
            active: None,
            state_tx,
            latch: ShutdownLatch::new(),
        }
    }

    /// Observe connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn publisher(&self) -> &PublishLoop {
        &self.publisher
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Run until `cancel` fires, then shut down.
    ///
    /// Returns an error only for failures that retrying cannot fix.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let result = self.supervise(&cancel).await;
        self.shutdown().await;
        result
    }

    async fn supervise(&mut self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.connect_once() => result,
            };

            match attempt {
                Ok(session) => {
                    if self.backoff.attempts() > 0 {
                        info!(
                            "Reconnected to room '{}' after {} failed attempts",
                            self.join.room,
                            self.backoff.attempts()
                        );
                    }
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);

                    match self.serve(session, cancel).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(reason) => {
                            warn!("Disconnected from room '{}': {}", self.join.room, reason);
                            self.teardown().await;
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Cannot join room '{}': {}", self.join.room, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = self.backoff.attempts() + 1,
                        "Failed to join room '{}': {}", self.join.room, e
                    );
                }
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = self.backoff.next_delay();
            info!(
                attempt = self.backoff.attempts(),
                "Retrying room join in {:?}", delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    /// Mint a credential, join, and publish the audio track
    async fn connect_once(&mut self) -> Result<RoomSession> {
        let credential = self.issuer.issue()?;
        debug!(
            "Joining room '{}' at {} as '{}'",
            self.join.room, self.join.url, credential.identity
        );
        let session = self.connector.connect(&self.join, &credential).await?;

        match session.handle.publish_audio(self.format).await {
            Ok(sink) => {
                self.publisher.attach_sink(sink);
                Ok(session)
            }
            Err(e) => {
                if let Err(leave_err) = session.handle.leave().await {
                    debug!("Leave after failed publish also failed: {}", leave_err);
                }
                Err(e)
            }
        }
    }

    /// Seed presence, start playback, and dispatch events until the session ends
    async fn serve(&mut self, session: RoomSession, cancel: &CancellationToken) -> SessionEnd {
        let RoomSession {
            handle,
            members,
            mut events,
        } = session;
        self.active = Some(handle);

        self.presence.resync(&members);
        self.begin_session().await;

        loop {
            match next_event(&mut events, cancel).await {
                None => return SessionEnd::Cancelled,
                Some(None) => return SessionEnd::Lost("room event stream closed".to_string()),
                Some(Some(RoomEvent::Disconnected(reason))) => return SessionEnd::Lost(reason),
                Some(Some(event)) => {
                    if let Some(change) = self.presence.observe(&event) {
                        self.apply_change(change).await;
                    }
                }
            }
        }
    }

    /// Each connection starts fresh: full gain when the beacon is absent,
    /// silent and stopped when it is present
    async fn begin_session(&mut self) {
        if self.presence.is_present() {
            self.publisher.set_gain(0.0);
            info!(
                "Beacon '{}' already live, ambient stream held",
                self.presence.beacon_identity()
            );
            return;
        }
        self.publisher.set_gain(1.0);
        if let Err(e) = self.publisher.start().await {
            warn!("Could not start publish loop: {}", e);
        }
    }

    async fn apply_change(&mut self, change: PresenceChange) {
        match change {
            PresenceChange::Arrived => self.publisher.duck(),
            PresenceChange::Departed => {
                if let Err(e) = self.publisher.unduck().await {
                    warn!("Could not resume publish loop: {}", e);
                }
            }
        }
    }

    /// Release local audio and leave the current room, if any
    async fn teardown(&mut self) {
        self.publisher.stop_and_wait().await;
        self.publisher.release_sink();

        if let Some(handle) = self.active.take() {
            if let Err(e) = handle.unpublish_audio().await {
                debug!("Unpublish failed: {}", e);
            }
            if let Err(e) = handle.leave().await {
                debug!("Leave failed: {}", e);
            }
        }
    }

    /// Ordered shutdown; runs once, later calls are no-ops
    pub async fn shutdown(&mut self) {
        if !self.latch.begin() {
            debug!("Shutdown already completed");
            return;
        }
        info!("Shutting down room connection");
        self.teardown().await;
        self.connector.shutdown().await;
        self.set_state(ConnectionState::Disconnected);
        info!("Room connection shut down");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Connection state: {} -> {}", previous, state);
        }
    }
}

/// Next room event; outer `None` means cancelled, inner `None` means the
/// channel closed
async fn next_event(
    events: &mut mpsc::UnboundedReceiver<RoomEvent>,
    cancel: &CancellationToken,
) -> Option<Option<RoomEvent>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        event = events.recv() => Some(event),
    }
}
