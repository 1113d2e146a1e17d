//! # Ambient Broadcast Agent Library (ambi-agent)
//!
//! Keeps an ambient playlist streaming into a shared real-time room and cedes
//! the floor with a smooth crossfade whenever the live broadcaster joins.
//!
//! **Architecture:** decode subprocess → frame slicer → crossfader → room
//! audio track, with a supervisor owning the connection and presence.

pub mod audio;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod playback;
pub mod room;
pub mod service;

pub use config::AgentConfig;
pub use error::{Error, Result};
