//! Network-free room transport
//!
//! Used for dry runs and soak tests when no real room server is available.
//! Frames are accepted at the real-time frame cadence and discarded, so the
//! whole decode/fade/publish pipeline runs exactly as it would against a live
//! room. Membership is fixed at construction.

use super::{
    AccessCredential, AudioSink, JoinOptions, RoomConnector, RoomEvent, RoomHandle, RoomSession,
};
use crate::audio::types::{DecodeFrame, FrameFormat};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Frames between progress log lines (~1 minute at 20ms frames)
const LOG_EVERY_FRAMES: u64 = 3000;

#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector {
    members: Vec<String>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend these identities are already in the room
    pub fn with_members(members: Vec<String>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl RoomConnector for LoopbackConnector {
    async fn connect(
        &self,
        options: &JoinOptions,
        credential: &AccessCredential,
    ) -> Result<RoomSession> {
        if credential.is_expired() {
            return Err(Error::Transport("credential already expired".to_string()));
        }
        info!(
            "Loopback room '{}' joined as '{}' (auto_subscribe={})",
            options.room, credential.identity, options.auto_subscribe
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(RoomSession {
            handle: Box::new(LoopbackHandle {
                events_tx,
                sink: Mutex::new(None),
            }),
            members: self.members.clone(),
            events: events_rx,
        })
    }
}

struct LoopbackHandle {
    // Held so the event channel stays open for the session's lifetime
    events_tx: mpsc::UnboundedSender<RoomEvent>,
    sink: Mutex<Option<Arc<LoopbackSink>>>,
}

#[async_trait]
impl RoomHandle for LoopbackHandle {
    async fn publish_audio(&self, format: FrameFormat) -> Result<Arc<dyn AudioSink>> {
        let sink = Arc::new(LoopbackSink::new(format));
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(Arc::clone(&sink));
        }
        info!(
            "Loopback track published ({} Hz, {} ms frames)",
            format.sample_rate, format.frame_ms
        );
        Ok(sink)
    }

    async fn unpublish_audio(&self) -> Result<()> {
        let sink = self.sink.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sink) = sink {
            info!("Loopback track unpublished after {} frames", sink.frames());
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        let _ = self
            .events_tx
            .send(RoomEvent::Disconnected("left room".to_string()));
        debug!("Loopback room left");
        Ok(())
    }
}

/// Real-time paced frame sink that discards audio
pub struct LoopbackSink {
    format: FrameFormat,
    pacer: tokio::sync::Mutex<Interval>,
    frames: AtomicU64,
}

impl LoopbackSink {
    pub fn new(format: FrameFormat) -> Self {
        let mut pacer = interval(format.frame_duration());
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            format,
            pacer: tokio::sync::Mutex::new(pacer),
            frames: AtomicU64::new(0),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AudioSink for LoopbackSink {
    async fn capture_frame(&self, frame: &DecodeFrame) -> Result<()> {
        if frame.samples.len() != self.format.samples_per_frame() {
            return Err(Error::Transport(format!(
                "frame has {} samples, track expects {}",
                frame.samples.len(),
                self.format.samples_per_frame()
            )));
        }
        self.pacer.lock().await.tick().await;
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if n % LOG_EVERY_FRAMES == 0 {
            debug!("Loopback sink: {} frames (peak {})", n, frame.peak());
        }
        Ok(())
    }
}
