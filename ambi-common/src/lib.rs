//! # Ambient Broadcast Common Library
//!
//! Shared code for the ambient broadcast agent and its tooling:
//! - Error type
//! - Bootstrap configuration loading
//! - Tracing initialisation
//! - Reconnect backoff policy
//! - Timestamp helpers

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use backoff::Backoff;
pub use error::{Error, Result};
