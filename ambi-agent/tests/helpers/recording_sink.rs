//! Frame sink that hands every published frame to the test

use ambi_agent::audio::types::DecodeFrame;
use ambi_agent::error::{Error, Result};
use ambi_agent::room::AudioSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct RecordingSink {
    tx: mpsc::Sender<DecodeFrame>,
    /// Reject frames whose first sample equals this value
    fail_on: Option<i16>,
    /// Reject only the n-th submission (1-based)
    fail_call: Option<usize>,
    calls: AtomicUsize,
}

impl RecordingSink {
    /// Bounded so an idle test applies backpressure like a real track
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<DecodeFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::build(tx, None, None)), rx)
    }

    pub fn failing_on(capacity: usize, value: i16) -> (Arc<Self>, mpsc::Receiver<DecodeFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::build(tx, Some(value), None)), rx)
    }

    pub fn failing_call(capacity: usize, call: usize) -> (Arc<Self>, mpsc::Receiver<DecodeFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::build(tx, None, Some(call))), rx)
    }

    fn build(tx: mpsc::Sender<DecodeFrame>, fail_on: Option<i16>, fail_call: Option<usize>) -> Self {
        Self {
            tx,
            fail_on,
            fail_call,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn capture_frame(&self, frame: &DecodeFrame) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_call == Some(call) {
            return Err(Error::Transport("rejected by test sink".to_string()));
        }
        if self.fail_on.is_some() && frame.samples.first().copied() == self.fail_on {
            return Err(Error::Transport("rejected by test sink".to_string()));
        }
        self.tx
            .send(frame.clone())
            .await
            .map_err(|_| Error::Transport("test receiver dropped".to_string()))
    }
}
