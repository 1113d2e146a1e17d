//! Room transport abstraction
//!
//! The agent talks to the real-time room through three narrow traits:
//!
//! - [`RoomConnector`] joins a room and returns a [`RoomSession`]
//! - [`RoomHandle`] publishes/unpublishes the agent's audio track and leaves
//! - [`AudioSink`] accepts one frame at a time, applying backpressure
//!
//! All membership and connection notifications arrive on the session's single
//! event channel, so the supervisor sees them strictly in order.

pub mod credential;
pub mod loopback;
pub mod presence;
pub mod supervisor;

#[cfg(feature = "livekit")]
pub mod livekit;

use crate::audio::types::{DecodeFrame, FrameFormat};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use credential::{AccessCredential, CredentialIssuer, LoopbackIssuer};
pub use presence::{PresenceChange, PresenceTracker};
pub use supervisor::Supervisor;

/// Membership and connection notifications from the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A participant with this identity joined
    ParticipantJoined(String),
    /// A participant with this identity left
    ParticipantLeft(String),
    /// The connection to the room was lost
    Disconnected(String),
}

/// Supervisor connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Where and how to join
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub url: String,
    pub room: String,
    /// This agent only publishes, so subscription stays off
    pub auto_subscribe: bool,
}

/// A live room connection
pub struct RoomSession {
    pub handle: Box<dyn RoomHandle>,
    /// Identities present at join time, used to seed presence
    pub members: Vec<String>,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

/// Accepts published audio frames
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Submit one frame. Resolves once the transport has room for it.
    async fn capture_frame(&self, frame: &DecodeFrame) -> Result<()>;
}

/// Operations on a joined room
#[async_trait]
pub trait RoomHandle: Send + Sync {
    /// Create and publish the agent's mono audio track
    async fn publish_audio(&self, format: FrameFormat) -> Result<Arc<dyn AudioSink>>;

    /// Unpublish the audio track and release its source
    async fn unpublish_audio(&self) -> Result<()>;

    /// Leave the room
    async fn leave(&self) -> Result<()>;
}

/// Joins rooms
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        options: &JoinOptions,
        credential: &AccessCredential,
    ) -> Result<RoomSession>;

    /// Release process-wide client resources. Called once, at shutdown.
    async fn shutdown(&self) {}
}
