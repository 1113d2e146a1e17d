//! Agent configuration
//!
//! Every setting resolves in the same order: command-line flag, `AMBI_*`
//! environment variable (both via clap), bootstrap TOML file, compiled
//! default. The resolved [`AgentConfig`] is validated once at startup; any
//! problem is fatal before the first network call.

use crate::audio::types::FrameFormat;
use crate::error::{Error, Result};
use crate::playback::playlist::DEFAULT_EXTENSIONS;
use crate::room::JoinOptions;
use ambi_common::config::TomlConfig;
use ambi_common::time::millis_to_duration;
use ambi_common::Backoff;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROOM_NAME: &str = "lobby";
pub const DEFAULT_IDENTITY: &str = "ambient-agent";
pub const DEFAULT_BEACON_IDENTITY: &str = "live-beacon";
pub const DEFAULT_PLAYLIST_DIR: &str = "./playlist";
pub const DEFAULT_HEARTBEAT_PATH: &str = "/tmp/ambi-agent.heartbeat";
pub const DEFAULT_DECODER: &str = "ffmpeg";
const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 600;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_FRAME_MS: u32 = 20;
const DEFAULT_CROSSFADE_MS: u64 = 2_000;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
const DEFAULT_RESCAN_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments for ambi-agent
#[derive(Parser, Debug, Default)]
#[command(name = "ambi-agent")]
#[command(about = "Streams an ambient playlist into a live room, ducking for the live broadcaster")]
#[command(version)]
pub struct Args {
    /// Bootstrap TOML file
    #[arg(short, long, env = "AMBI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Room server URL
    #[arg(long, env = "AMBI_ROOM_URL")]
    pub room_url: Option<String>,

    /// Room to join
    #[arg(long, env = "AMBI_ROOM_NAME")]
    pub room_name: Option<String>,

    /// Participant identity of this agent
    #[arg(long, env = "AMBI_IDENTITY")]
    pub identity: Option<String>,

    #[arg(long, env = "AMBI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "AMBI_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Lifetime of each minted access credential
    #[arg(long, env = "AMBI_CREDENTIAL_TTL_SECS")]
    pub credential_ttl_secs: Option<u64>,

    /// Directory of ready-to-play audio files
    #[arg(short, long, env = "AMBI_PLAYLIST_DIR")]
    pub playlist_dir: Option<PathBuf>,

    /// Recognized file extensions (comma separated)
    #[arg(long, env = "AMBI_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Identity of the live broadcaster that ducks the ambient stream
    #[arg(long, env = "AMBI_BEACON_IDENTITY")]
    pub beacon_identity: Option<String>,

    #[arg(long, env = "AMBI_SAMPLE_RATE")]
    pub sample_rate: Option<u32>,

    #[arg(long, env = "AMBI_FRAME_MS")]
    pub frame_ms: Option<u32>,

    /// Duration of a full-scale fade
    #[arg(long, env = "AMBI_CROSSFADE_MS")]
    pub crossfade_ms: Option<u64>,

    #[arg(long, env = "AMBI_BACKOFF_BASE_MS")]
    pub backoff_base_ms: Option<u64>,

    #[arg(long, env = "AMBI_BACKOFF_CAP_MS")]
    pub backoff_cap_ms: Option<u64>,

    /// Sleep between scans of an empty playlist
    #[arg(long, env = "AMBI_RESCAN_INTERVAL_MS")]
    pub rescan_interval_ms: Option<u64>,

    #[arg(long, env = "AMBI_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: Option<u64>,

    #[arg(long, env = "AMBI_HEARTBEAT_PATH")]
    pub heartbeat_path: Option<PathBuf>,

    /// Decode tool, looked up on PATH
    #[arg(long, env = "AMBI_DECODER")]
    pub decoder: Option<String>,

    #[arg(long, env = "AMBI_TRANSPORT", value_enum)]
    pub transport: Option<TransportKind>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "AMBI_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Room transport implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Livekit,
    Loopback,
}

impl TransportKind {
    /// LiveKit when compiled in, otherwise loopback
    pub fn build_default() -> Self {
        if cfg!(feature = "livekit") {
            TransportKind::Livekit
        } else {
            TransportKind::Loopback
        }
    }

    fn parse(value: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(value, true)
            .map_err(|_| Error::Config(format!("Unknown transport '{}'", value)))
    }
}

/// Fully resolved agent settings
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub transport: TransportKind,
    pub room_url: Option<String>,
    pub room_name: String,
    pub identity: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(skip)]
    pub api_secret: Option<String>,
    pub credential_ttl_secs: u64,
    pub playlist_dir: PathBuf,
    pub extensions: Vec<String>,
    pub beacon_identity: String,
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub crossfade_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub rescan_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_path: PathBuf,
    pub decoder: String,
    pub log_level: String,
}

impl AgentConfig {
    /// Merge flags/env over the bootstrap file over defaults
    pub fn resolve(args: &Args, file: &TomlConfig) -> Result<Self> {
        let transport = match (args.transport, file.room.transport.as_deref()) {
            (Some(kind), _) => kind,
            (None, Some(name)) => TransportKind::parse(name)?,
            (None, None) => TransportKind::build_default(),
        };

        let extensions = args
            .extensions
            .clone()
            .or_else(|| file.playlist.extensions.clone())
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());

        Ok(Self {
            transport,
            room_url: args.room_url.clone().or_else(|| file.room.url.clone()),
            room_name: pick(&args.room_name, &file.room.name, DEFAULT_ROOM_NAME),
            identity: pick(&args.identity, &file.room.identity, DEFAULT_IDENTITY),
            api_key: args.api_key.clone().or_else(|| file.room.api_key.clone()),
            api_secret: args.api_secret.clone().or_else(|| file.room.api_secret.clone()),
            credential_ttl_secs: args
                .credential_ttl_secs
                .or(file.room.credential_ttl_secs)
                .unwrap_or(DEFAULT_CREDENTIAL_TTL_SECS),
            playlist_dir: args
                .playlist_dir
                .clone()
                .or_else(|| file.playlist.dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYLIST_DIR)),
            extensions,
            beacon_identity: pick(
                &args.beacon_identity,
                &file.room.beacon_identity,
                DEFAULT_BEACON_IDENTITY,
            ),
            sample_rate: args
                .sample_rate
                .or(file.audio.sample_rate)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
            frame_ms: args
                .frame_ms
                .or(file.audio.frame_ms)
                .unwrap_or(DEFAULT_FRAME_MS),
            crossfade_ms: args
                .crossfade_ms
                .or(file.audio.crossfade_ms)
                .unwrap_or(DEFAULT_CROSSFADE_MS),
            backoff_base_ms: args
                .backoff_base_ms
                .or(file.reconnect.backoff_base_ms)
                .unwrap_or(DEFAULT_BACKOFF_BASE_MS),
            backoff_cap_ms: args
                .backoff_cap_ms
                .or(file.reconnect.backoff_cap_ms)
                .unwrap_or(DEFAULT_BACKOFF_CAP_MS),
            rescan_interval_ms: args
                .rescan_interval_ms
                .or(file.playlist.rescan_interval_ms)
                .unwrap_or(DEFAULT_RESCAN_INTERVAL_MS),
            heartbeat_interval_ms: args
                .heartbeat_interval_ms
                .or(file.health.heartbeat_interval_ms)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_path: args
                .heartbeat_path
                .clone()
                .or_else(|| file.health.heartbeat_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HEARTBEAT_PATH)),
            decoder: pick(&args.decoder, &file.audio.decoder, DEFAULT_DECODER),
            log_level: args
                .log_level
                .clone()
                .unwrap_or_else(|| non_empty_or(&file.logging.level, DEFAULT_LOG_LEVEL)),
        })
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.frame_ms == 0 {
            return Err(Error::Config(
                "sample_rate and frame_ms must be positive".to_string(),
            ));
        }
        if !self.format().is_exact() {
            return Err(Error::Config(format!(
                "{} ms frames at {} Hz do not hold a whole number of samples",
                self.frame_ms, self.sample_rate
            )));
        }
        if self.crossfade_ms == 0 {
            return Err(Error::Config("crossfade_ms must be positive".to_string()));
        }
        if self.backoff_base_ms == 0 || self.backoff_base_ms > self.backoff_cap_ms {
            return Err(Error::Config(format!(
                "backoff base ({} ms) must be positive and not exceed cap ({} ms)",
                self.backoff_base_ms, self.backoff_cap_ms
            )));
        }
        if self.rescan_interval_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(
                "rescan and heartbeat intervals must be positive".to_string(),
            ));
        }
        if self.credential_ttl_secs == 0 {
            return Err(Error::Config("credential_ttl_secs must be positive".to_string()));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Config("no playlist extensions configured".to_string()));
        }
        for (name, value) in [
            ("room_name", &self.room_name),
            ("identity", &self.identity),
            ("beacon_identity", &self.beacon_identity),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        if self.transport == TransportKind::Livekit {
            if !cfg!(feature = "livekit") {
                return Err(Error::Config(
                    "livekit transport selected but this build has no livekit support".to_string(),
                ));
            }
            let missing: Vec<&str> = [
                ("room_url", &self.room_url),
                ("api_key", &self.api_key),
                ("api_secret", &self.api_secret),
            ]
            .into_iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| name)
            .collect();
            if !missing.is_empty() {
                return Err(Error::Config(format!(
                    "livekit transport requires {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn format(&self) -> FrameFormat {
        FrameFormat::new(self.sample_rate, self.frame_ms)
    }

    pub fn crossfade(&self) -> Duration {
        millis_to_duration(self.crossfade_ms)
    }

    pub fn rescan_interval(&self) -> Duration {
        millis_to_duration(self.rescan_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        millis_to_duration(self.heartbeat_interval_ms)
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            millis_to_duration(self.backoff_base_ms),
            millis_to_duration(self.backoff_cap_ms),
        )
    }

    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            url: self.room_url.clone().unwrap_or_default(),
            room: self.room_name.clone(),
            auto_subscribe: false,
        }
    }

    /// Resolved settings as TOML, secrets omitted
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Cannot render configuration: {}", e)))
    }
}

fn pick(flag: &Option<String>, file: &Option<String>, default: &str) -> String {
    flag.clone()
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_args() -> Args {
        Args {
            transport: Some(TransportKind::Loopback),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::resolve(&loopback_args(), &TomlConfig::default()).unwrap();
        assert_eq!(config.room_name, "lobby");
        assert_eq!(config.identity, "ambient-agent");
        assert_eq!(config.beacon_identity, "live-beacon");
        assert_eq!(config.format(), FrameFormat::new(48_000, 20));
        assert_eq!(config.crossfade(), Duration::from_millis(2000));
        assert_eq!(config.backoff().base(), Duration::from_secs(1));
        assert_eq!(config.backoff().cap(), Duration::from_secs(30));
        assert_eq!(config.rescan_interval(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.decoder, "ffmpeg");
        assert_eq!(config.extensions.len(), DEFAULT_EXTENSIONS.len());
        assert!(config.validate().is_ok());
        assert!(!config.join_options().auto_subscribe);
    }

    #[test]
    fn test_flags_override_file_override_defaults() {
        let file = TomlConfig::parse(
            r#"
            [room]
            name = "from-file"
            identity = "file-agent"

            [audio]
            crossfade_ms = 500

            [playlist]
            extensions = ["wav"]
            "#,
        )
        .unwrap();
        let args = Args {
            room_name: Some("from-flag".to_string()),
            ..loopback_args()
        };

        let config = AgentConfig::resolve(&args, &file).unwrap();
        assert_eq!(config.room_name, "from-flag");
        assert_eq!(config.identity, "file-agent");
        assert_eq!(config.crossfade_ms, 500);
        assert_eq!(config.extensions, vec!["wav".to_string()]);
        assert_eq!(config.frame_ms, 20);
    }

    #[test]
    fn test_transport_from_file_and_unknown_transport() {
        let file = TomlConfig::parse("[room]\ntransport = \"Loopback\"\n").unwrap();
        let config = AgentConfig::resolve(&Args::default(), &file).unwrap();
        assert_eq!(config.transport, TransportKind::Loopback);

        let file = TomlConfig::parse("[room]\ntransport = \"carrier-pigeon\"\n").unwrap();
        assert!(matches!(
            AgentConfig::resolve(&Args::default(), &file),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_inexact_frame_rejected() {
        let args = Args {
            sample_rate: Some(44_100),
            frame_ms: Some(15),
            ..loopback_args()
        };
        let config = AgentConfig::resolve(&args, &TomlConfig::default()).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_base_above_cap_rejected() {
        let args = Args {
            backoff_base_ms: Some(5_000),
            backoff_cap_ms: Some(1_000),
            ..loopback_args()
        };
        let config = AgentConfig::resolve(&args, &TomlConfig::default()).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_livekit_requires_credentials() {
        let args = Args {
            transport: Some(TransportKind::Livekit),
            room_url: Some("wss://rooms.example.net".to_string()),
            ..Default::default()
        };
        let config = AgentConfig::resolve(&args, &TomlConfig::default()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        if cfg!(feature = "livekit") {
            let message = err.to_string();
            assert!(message.contains("api_key"));
            assert!(message.contains("api_secret"));
            assert!(!message.contains("room_url"));
        }
    }

    #[test]
    fn test_print_config_omits_secrets() {
        let args = Args {
            api_key: Some("key-123".to_string()),
            api_secret: Some("very-secret".to_string()),
            ..loopback_args()
        };
        let config = AgentConfig::resolve(&args, &TomlConfig::default()).unwrap();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("room_name = \"lobby\""));
        assert!(rendered.contains("transport = \"loopback\""));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("key-123"));
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_fills_unset_flags() {
        std::env::set_var("AMBI_ROOM_NAME", "from-env");
        std::env::set_var("AMBI_CROSSFADE_MS", "750");
        let from_env = Args::try_parse_from(["ambi-agent"]).unwrap();
        let flag_wins =
            Args::try_parse_from(["ambi-agent", "--room-name", "from-flag"]).unwrap();
        std::env::remove_var("AMBI_ROOM_NAME");
        std::env::remove_var("AMBI_CROSSFADE_MS");

        assert_eq!(from_env.room_name.as_deref(), Some("from-env"));
        assert_eq!(from_env.crossfade_ms, Some(750));
        assert_eq!(flag_wins.room_name.as_deref(), Some("from-flag"));
    }

    #[test]
    #[serial_test::serial]
    fn test_config_path_from_environment() {
        std::env::set_var("AMBI_CONFIG", "/etc/ambi/studio.toml");
        let from_env = Args::try_parse_from(["ambi-agent"]).unwrap();
        let flag_wins =
            Args::try_parse_from(["ambi-agent", "--config", "/tmp/override.toml"]).unwrap();
        std::env::remove_var("AMBI_CONFIG");

        assert_eq!(from_env.config, Some(PathBuf::from("/etc/ambi/studio.toml")));
        assert_eq!(flag_wins.config, Some(PathBuf::from("/tmp/override.toml")));
    }

    #[test]
    #[serial_test::serial]
    fn test_extensions_flag_is_comma_separated() {
        let args = Args::try_parse_from(["ambi-agent", "--extensions", "mp3,flac"]).unwrap();
        assert_eq!(
            args.extensions,
            Some(vec!["mp3".to_string(), "flac".to_string()])
        );
    }
}
