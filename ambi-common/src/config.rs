//! Bootstrap configuration loading and config file resolution
//!
//! The bootstrap file is optional. Every key may be omitted; missing keys fall
//! through to the service's compiled defaults. Resolution order for the file
//! itself:
//! 1. Explicit path supplied by the caller (the agent's `--config` flag,
//!    which clap also fills from `AMBI_CONFIG`)
//! 2. User config directory (`~/.config/ambi/config.toml` on Linux)
//! 3. System config (`/etc/ambi/config.toml`, Unix only)
//!
//! A missing file is never an error. A file that exists but cannot be parsed is.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config directory
const CONFIG_DIR_NAME: &str = "ambi";

/// File name of the bootstrap configuration
const CONFIG_FILE_NAME: &str = "config.toml";

/// Bootstrap configuration loaded from TOML
///
/// All fields are optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub room: RoomSection,
    pub playlist: PlaylistSection,
    pub audio: AudioSection,
    pub reconnect: ReconnectSection,
    pub health: HealthSection,
    pub logging: LoggingConfig,
}

/// `[room]` section: transport endpoint and identities
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoomSection {
    pub url: Option<String>,
    pub name: Option<String>,
    pub identity: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub credential_ttl_secs: Option<u64>,
    pub beacon_identity: Option<String>,
    pub transport: Option<String>,
}

/// `[playlist]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlaylistSection {
    pub dir: Option<PathBuf>,
    pub extensions: Option<Vec<String>>,
    pub rescan_interval_ms: Option<u64>,
}

/// `[audio]` section: frame format and fade length
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub sample_rate: Option<u32>,
    pub frame_ms: Option<u32>,
    pub crossfade_ms: Option<u64>,
    pub decoder: Option<String>,
}

/// `[reconnect]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
}

/// `[health]` section: liveness artifact
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub heartbeat_path: Option<PathBuf>,
    pub heartbeat_interval_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a bootstrap file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse bootstrap TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve and load the bootstrap file.
    ///
    /// Returns defaults when no file is found. An explicitly requested file
    /// that does not exist is reported as a configuration error, since the
    /// operator clearly expected it to be there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        match locate_config_file() {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Find the bootstrap file in the user, then system, config location
pub fn locate_config_file() -> Option<PathBuf> {
    if let Some(path) = user_config_path() {
        if path.exists() {
            return Some(path);
        }
    }

    let system = system_config_path();
    match system {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// `~/.config/ambi/config.toml` (or the platform equivalent)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn system_config_path() -> Option<PathBuf> {
    if cfg!(unix) {
        Some(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert!(config.room.url.is_none());
        assert!(config.playlist.dir.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = TomlConfig::parse(
            r#"
            [room]
            url = "wss://rooms.example.net"
            beacon_identity = "dj-booth"

            [audio]
            crossfade_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.room.url.as_deref(), Some("wss://rooms.example.net"));
        assert_eq!(config.room.beacon_identity.as_deref(), Some("dj-booth"));
        assert!(config.room.name.is_none());
        assert_eq!(config.audio.crossfade_ms, Some(1500));
        assert!(config.audio.sample_rate.is_none());
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let result = TomlConfig::parse("[room\nurl = ");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_wrong_type_is_error() {
        let result = TomlConfig::parse("[audio]\nsample_rate = \"fast\"\n");
        assert!(result.is_err());
    }
}
