//! Error types for ambi-agent
//!
//! Only `Config` is fatal, and only at startup. Every other variant is absorbed
//! by the component that produced it: logged, then retried or skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Access credential could not be minted
    #[error("Credential error: {0}")]
    Credential(String),

    /// Room join, publish, or frame capture failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Decode process could not be started or its stream failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Publish loop misuse (e.g. start without a published track)
    #[error("Playback error: {0}")]
    Playback(String),
}

impl Error {
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error should stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Convenience Result type using the agent Error
pub type Result<T> = std::result::Result<T, Error>;
