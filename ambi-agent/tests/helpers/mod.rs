//! Test helpers for ambi-agent integration tests
//!
//! Provides in-process stand-ins for the external collaborators:
//! - MemoryDecoder: serves PCM from memory instead of a decode subprocess
//! - RecordingSink: captures published frames on a bounded channel
//! - ScriptedConnector: a room whose join outcomes and events tests control

#![allow(dead_code, unused_imports)]

pub mod memory_decoder;
pub mod recording_sink;
pub mod scripted_room;

pub use memory_decoder::{constant_pcm, MemoryDecoder};
pub use recording_sink::RecordingSink;
pub use scripted_room::{JoinOutcome, ScriptedConnector};

use ambi_agent::audio::types::FrameFormat;
use std::path::Path;

/// 80-sample frames keep tests light
pub const TEST_FORMAT: FrameFormat = FrameFormat {
    sample_rate: 8_000,
    frame_ms: 10,
};

/// Create an (empty) playlist file; content comes from the decoder
pub fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"").unwrap();
}
