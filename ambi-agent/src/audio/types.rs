//! Frame format and frame assembly
//!
//! The publish path works in fixed-size mono frames of signed 16-bit samples.
//! Decoders hand back arbitrary byte counts; `FrameSlicer` buffers them and
//! releases only whole frames, each as an owned byte copy so that conversion
//! to samples never aliases a buffer the I/O layer may reuse.

/// Bytes per signed 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Published channel count (mono)
pub const CHANNELS: u32 = 1;

/// Fixed sample rate / frame duration pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub frame_ms: u32,
}

impl FrameFormat {
    pub fn new(sample_rate: u32, frame_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_ms,
        }
    }

    /// Samples in one frame: `sample_rate * frame_ms / 1000`
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_ms as u64 / 1000) as usize
    }

    /// Bytes in one frame of s16le mono
    pub fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * BYTES_PER_SAMPLE
    }

    /// Whether the frame duration holds a whole number of samples
    pub fn is_exact(&self) -> bool {
        (self.sample_rate as u64 * self.frame_ms as u64) % 1000 == 0
    }

    /// Number of frames covering `duration_ms`, rounded to nearest
    pub fn frames_for_millis(&self, duration_ms: u64) -> u32 {
        if self.frame_ms == 0 {
            return 0;
        }
        ((duration_ms as f64) / (self.frame_ms as f64)).round() as u32
    }

    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_ms as u64)
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(48_000, 20)
    }
}

/// One publish tick of audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFrame {
    /// Mono samples, exactly `samples_per_frame` long
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Publish loop generation that produced this frame
    pub generation: u64,
}

impl DecodeFrame {
    pub fn samples_per_channel(&self) -> u32 {
        self.samples.len() as u32
    }

    /// Peak absolute sample value (i32 so that i16::MIN does not overflow)
    pub fn peak(&self) -> i32 {
        self.samples
            .iter()
            .map(|&s| (s as i32).abs())
            .max()
            .unwrap_or(0)
    }
}

/// Reinterpret an owned little-endian byte block as samples.
///
/// A trailing odd byte is ignored; callers only pass whole frames.
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Scale samples in place by `gain`.
///
/// 1.0 leaves samples untouched and 0.0 writes exact silence.
pub fn apply_gain(samples: &mut [i16], gain: f32) {
    if gain >= 1.0 {
        return;
    }
    if gain <= 0.0 {
        samples.fill(0);
        return;
    }
    for s in samples.iter_mut() {
        let scaled = (*s as f32 * gain).round();
        *s = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Accumulates decoder output and yields whole frames
#[derive(Debug)]
pub struct FrameSlicer {
    bytes_per_frame: usize,
    pending: Vec<u8>,
}

impl FrameSlicer {
    pub fn new(bytes_per_frame: usize) -> Self {
        Self {
            bytes_per_frame,
            pending: Vec::with_capacity(bytes_per_frame * 2),
        }
    }

    /// Append freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next whole frame, if one is buffered.
    ///
    /// The returned vector is a new allocation, independent of the slicer's
    /// internal buffer.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.bytes_per_frame == 0 || self.pending.len() < self.bytes_per_frame {
            return None;
        }
        Some(self.pending.drain(..self.bytes_per_frame).collect())
    }

    /// Bytes buffered but not yet a whole frame
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }

    /// Drop any partial frame (end of file)
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
