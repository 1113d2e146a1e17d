//! Audio frame types and the subprocess decoder

pub mod decoder;
pub mod types;

pub use decoder::{DecodeExit, FfmpegDecoder, PcmDecoder, PcmStream};
pub use types::{DecodeFrame, FrameFormat, FrameSlicer};
