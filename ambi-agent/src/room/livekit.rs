//! LiveKit room transport
//!
//! Joins with auto-subscribe off, publishes one mono track backed by a
//! `NativeAudioSource`, and forwards participant join/leave and disconnect
//! notifications into the session's event channel.

use super::{
    AccessCredential, AudioSink, CredentialIssuer, JoinOptions, RoomConnector, RoomEvent,
    RoomHandle, RoomSession,
};
use crate::audio::types::{DecodeFrame, FrameFormat, CHANNELS};
use crate::error::{Error, Result};
use crate::room::credential::expiry_after;
use async_trait::async_trait;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{LocalAudioTrack, LocalTrack, Room, TrackSid};
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::RoomOptions;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Buffered capture queue in the native source
const SOURCE_QUEUE_MS: u32 = 100;

const TRACK_NAME: &str = "ambient";

/// Mints LiveKit JWTs granting join + publish on one room
pub struct LiveKitIssuer {
    api_key: String,
    api_secret: String,
    identity: String,
    room: String,
    ttl: Duration,
}

impl LiveKitIssuer {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        identity: impl Into<String>,
        room: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            identity: identity.into(),
            room: room.into(),
            ttl,
        }
    }
}

impl CredentialIssuer for LiveKitIssuer {
    fn issue(&self) -> Result<AccessCredential> {
        let token = AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(&self.identity)
            .with_name(&self.identity)
            .with_ttl(self.ttl)
            .with_grants(VideoGrants {
                room_join: true,
                room: self.room.clone(),
                can_publish: true,
                can_subscribe: false,
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| Error::Credential(e.to_string()))?;

        Ok(AccessCredential {
            token,
            identity: self.identity.clone(),
            room: self.room.clone(),
            expires_at: expiry_after(self.ttl),
        })
    }
}

#[derive(Debug, Default)]
pub struct LiveKitConnector;

impl LiveKitConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RoomConnector for LiveKitConnector {
    async fn connect(
        &self,
        options: &JoinOptions,
        credential: &AccessCredential,
    ) -> Result<RoomSession> {
        let mut room_options = RoomOptions::default();
        room_options.auto_subscribe = options.auto_subscribe;

        let (room, lk_events) = Room::connect(&options.url, &credential.token, room_options)
            .await
            .map_err(|e| Error::Transport(format!("room connect failed: {}", e)))?;

        let members: Vec<String> = room
            .remote_participants()
            .values()
            .map(|p| p.identity().to_string())
            .collect();
        info!(
            "Joined LiveKit room '{}' as '{}' ({} other participants)",
            options.room,
            credential.identity,
            members.len()
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_events(lk_events, events_tx));

        Ok(RoomSession {
            handle: Box::new(LiveKitHandle {
                room: Arc::new(room),
                published: Mutex::new(None),
                forwarder,
            }),
            members,
            events: events_rx,
        })
    }
}

/// Translate SDK events into our event stream, in order
async fn forward_events(
    mut lk_events: mpsc::UnboundedReceiver<livekit::RoomEvent>,
    events_tx: mpsc::UnboundedSender<RoomEvent>,
) {
    while let Some(event) = lk_events.recv().await {
        let mapped = match event {
            livekit::RoomEvent::ParticipantConnected(p) => {
                RoomEvent::ParticipantJoined(p.identity().to_string())
            }
            livekit::RoomEvent::ParticipantDisconnected(p) => {
                RoomEvent::ParticipantLeft(p.identity().to_string())
            }
            livekit::RoomEvent::Disconnected { reason } => {
                RoomEvent::Disconnected(format!("{:?}", reason))
            }
            other => {
                debug!("Ignoring room event: {:?}", other);
                continue;
            }
        };
        let last = matches!(mapped, RoomEvent::Disconnected(_));
        if events_tx.send(mapped).is_err() || last {
            break;
        }
    }
}

struct LiveKitHandle {
    room: Arc<Room>,
    published: Mutex<Option<TrackSid>>,
    forwarder: JoinHandle<()>,
}

#[async_trait]
impl RoomHandle for LiveKitHandle {
    async fn publish_audio(&self, format: FrameFormat) -> Result<Arc<dyn AudioSink>> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: false,
                noise_suppression: false,
                auto_gain_control: false,
            },
            format.sample_rate,
            CHANNELS,
            SOURCE_QUEUE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            TRACK_NAME,
            RtcAudioSource::Native(source.clone()),
        );

        let publication = self
            .room
            .local_participant()
            .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
            .await
            .map_err(|e| Error::Transport(format!("publish track failed: {}", e)))?;

        if let Ok(mut slot) = self.published.lock() {
            *slot = Some(publication.sid());
        }
        info!("Published audio track '{}'", TRACK_NAME);

        Ok(Arc::new(LiveKitSink { source }))
    }

    async fn unpublish_audio(&self) -> Result<()> {
        let sid = self.published.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sid) = sid {
            self.room
                .local_participant()
                .unpublish_track(&sid)
                .await
                .map_err(|e| Error::Transport(format!("unpublish failed: {}", e)))?;
            debug!("Unpublished audio track");
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.forwarder.abort();
        self.room
            .close()
            .await
            .map_err(|e| Error::Transport(format!("leave failed: {}", e)))
    }
}

struct LiveKitSink {
    source: NativeAudioSource,
}

#[async_trait]
impl AudioSink for LiveKitSink {
    async fn capture_frame(&self, frame: &DecodeFrame) -> Result<()> {
        let audio = AudioFrame {
            data: Cow::Borrowed(&frame.samples),
            sample_rate: frame.sample_rate,
            num_channels: CHANNELS,
            samples_per_channel: frame.samples_per_channel(),
        };
        self.source
            .capture_frame(&audio)
            .await
            .map_err(|e| Error::Transport(format!("capture failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_produces_jwt_for_room() {
        let issuer = LiveKitIssuer::new(
            "devkey",
            "0123456789abcdef0123456789abcdef",
            "ambient-agent",
            "lobby",
            Duration::from_secs(600),
        );
        let credential = issuer.issue().unwrap();
        assert_eq!(credential.token.split('.').count(), 3);
        assert_eq!(credential.room, "lobby");
        assert!(!credential.is_expired());
    }
}
