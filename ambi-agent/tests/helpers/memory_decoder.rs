//! In-memory PCM decoder
//!
//! Tracks are keyed by file name. Opening a file with no registered track
//! fails like a decoder that cannot start.

use ambi_agent::audio::decoder::{DecodeExit, PcmDecoder, PcmStream};
use ambi_agent::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Bytes handed out per read, deliberately not frame aligned
const READ_CHUNK: usize = 1000;

/// s16le bytes of `samples` copies of `value`
pub fn constant_pcm(value: i16, samples: usize) -> Vec<u8> {
    value
        .to_le_bytes()
        .iter()
        .copied()
        .cycle()
        .take(samples * 2)
        .collect()
}

#[derive(Default)]
pub struct MemoryDecoder {
    tracks: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    opens: Mutex<Vec<String>>,
    terminations: Arc<AtomicUsize>,
}

impl MemoryDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, name: &str, pcm: Vec<u8>) {
        self.tracks
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(pcm));
    }

    /// File names opened so far, in order
    pub fn opens(&self) -> Vec<String> {
        self.opens.lock().unwrap().clone()
    }

    /// Streams killed before end of stream
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PcmDecoder for MemoryDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn PcmStream>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.opens.lock().unwrap().push(name.clone());

        let data = self
            .tracks
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::decode(path, "unsupported format"))?;

        Ok(Box::new(MemoryStream {
            data,
            pos: 0,
            terminated: false,
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

struct MemoryStream {
    data: Arc<Vec<u8>>,
    pos: usize,
    terminated: bool,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl PcmStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        tokio::task::yield_now().await;
        let n = buf.len().min(READ_CHUNK).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    async fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn finish(&mut self) -> DecodeExit {
        if self.terminated {
            DecodeExit::Killed
        } else {
            DecodeExit::Success
        }
    }
}
