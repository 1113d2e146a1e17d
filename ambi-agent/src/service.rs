//! Service assembly
//!
//! Builds the transport, decoder, publish loop and supervisor from a
//! validated [`AgentConfig`] and runs them until a termination signal.

use crate::audio::decoder::{FfmpegDecoder, PcmDecoder};
use crate::config::{AgentConfig, TransportKind};
use crate::error::{Error, Result};
use crate::health::Heartbeat;
use crate::lifecycle::spawn_signal_listener;
use crate::playback::{PlaylistSource, PublishConfig, PublishLoop};
use crate::room::loopback::LoopbackConnector;
use crate::room::{CredentialIssuer, LoopbackIssuer, PresenceTracker, RoomConnector, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Transport pieces for one room backend
pub struct Transport {
    pub connector: Arc<dyn RoomConnector>,
    pub issuer: Arc<dyn CredentialIssuer>,
}

impl Transport {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Loopback => Ok(Self {
                connector: Arc::new(LoopbackConnector::new()),
                issuer: Arc::new(LoopbackIssuer::new(
                    config.identity.clone(),
                    config.room_name.clone(),
                    config.credential_ttl(),
                )),
            }),
            TransportKind::Livekit => livekit_transport(config),
        }
    }
}

#[cfg(feature = "livekit")]
fn livekit_transport(config: &AgentConfig) -> Result<Transport> {
    use crate::room::livekit::{LiveKitConnector, LiveKitIssuer};

    let (Some(key), Some(secret)) = (config.api_key.clone(), config.api_secret.clone()) else {
        return Err(Error::Config("livekit transport requires api_key and api_secret".to_string()));
    };
    Ok(Transport {
        connector: Arc::new(LiveKitConnector::new()),
        issuer: Arc::new(LiveKitIssuer::new(
            key,
            secret,
            config.identity.clone(),
            config.room_name.clone(),
            config.credential_ttl(),
        )),
    })
}

#[cfg(not(feature = "livekit"))]
fn livekit_transport(_config: &AgentConfig) -> Result<Transport> {
    Err(Error::Config(
        "livekit transport selected but this build has no livekit support".to_string(),
    ))
}

/// Wire the supervisor around a transport and decoder
pub fn build_supervisor(
    config: &AgentConfig,
    transport: Transport,
    decoder: Arc<dyn PcmDecoder>,
) -> Supervisor {
    let format = config.format();
    let playlist = PlaylistSource::new(config.playlist_dir.clone(), config.extensions.as_slice());
    let publisher = PublishLoop::new(
        playlist,
        decoder,
        PublishConfig::new(format, config.crossfade(), config.rescan_interval()),
    );

    Supervisor::new(
        transport.connector,
        transport.issuer,
        publisher,
        PresenceTracker::new(config.beacon_identity.clone()),
        config.backoff(),
        config.join_options(),
        format,
    )
}

/// Run the agent until SIGINT/SIGTERM
///
/// `decoder_path` is the resolved decode tool.
pub async fn run(config: AgentConfig, decoder_path: PathBuf) -> Result<()> {
    let cancel = CancellationToken::new();
    let signals = spawn_signal_listener(cancel.clone());
    let heartbeat = Heartbeat::new(config.heartbeat_path.clone(), config.heartbeat_interval())
        .spawn(cancel.clone());

    let decoder: Arc<dyn PcmDecoder> = Arc::new(FfmpegDecoder::new(decoder_path, config.format()));
    let transport = Transport::from_config(&config)?;
    let mut supervisor = build_supervisor(&config, transport, decoder);

    info!(
        "Streaming {} into room '{}' via {:?} transport (beacon '{}')",
        config.playlist_dir.display(),
        config.room_name,
        config.transport,
        config.beacon_identity
    );

    let result = supervisor.run(cancel.clone()).await;

    // Supervisor exit without a signal (fatal error) still stops the rest
    cancel.cancel();
    supervisor.shutdown().await;
    let _ = heartbeat.await;
    let _ = signals.await;
    result
}
