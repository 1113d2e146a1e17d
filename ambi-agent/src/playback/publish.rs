//! Publish loop
//!
//! Streams the playlist into the room's audio track, one fixed-size frame at
//! a time. The transport's backpressure paces decoding to real time.
//!
//! # Activations
//!
//! Every [`PublishLoop::start`] arms a new generation and spawns one worker
//! task. A worker may only emit while its generation is both the current one
//! and the one marked running; it also holds a cancellation token that is
//! checked at every suspension point. A superseded worker therefore stops at
//! the next frame boundary and never emits after its successor's first frame.
//!
//! # Gain
//!
//! The [`Crossfader`] lives beside the running marker in one short critical
//! section. Frame application and external fade triggers (`duck`, `unduck`)
//! take the same lock, and it is never held across an await.
//!
//! A fade step is spent only when its frame is accepted. A rejected or
//! cancelled submission hands the step back, so the next frame (possibly the
//! first of the next file) continues the ramp without a jump.

use crate::audio::decoder::{DecodeExit, PcmDecoder, PcmStream};
use crate::audio::types::{samples_from_le_bytes, DecodeFrame, FrameFormat, FrameSlicer};
use crate::error::{Error, Result};
use crate::playback::crossfade::{CrossfadeState, Crossfader, FadeDirection, FadeStep};
use crate::playback::playlist::PlaylistSource;
use crate::room::AudioSink;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Bytes requested from the decoder per read
const DEFAULT_READ_CHUNK: usize = 8192;

/// Publish loop timing and framing
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub format: FrameFormat,
    /// Frames for a full-scale (0.0 to 1.0) fade
    pub max_fade_frames: u32,
    /// Sleep between scans of an empty playlist
    pub rescan_interval: Duration,
    pub read_chunk: usize,
}

impl PublishConfig {
    pub fn new(format: FrameFormat, crossfade: Duration, rescan_interval: Duration) -> Self {
        let max_fade_frames = format
            .frames_for_millis(crossfade.as_millis() as u64)
            .max(1);
        Self {
            format,
            max_fade_frames,
            rescan_interval,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

struct PublishState {
    crossfader: Crossfader,
    /// Generation allowed to emit, if any
    running: Option<u64>,
}

struct Shared {
    generation: AtomicU64,
    state: Mutex<PublishState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PublishState> {
        // Gain state stays usable even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owner of the publish worker and its gain state
pub struct PublishLoop {
    shared: Arc<Shared>,
    playlist: Arc<PlaylistSource>,
    decoder: Arc<dyn PcmDecoder>,
    config: PublishConfig,
    sink: Option<Arc<dyn AudioSink>>,
    cancel: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl PublishLoop {
    pub fn new(
        playlist: PlaylistSource,
        decoder: Arc<dyn PcmDecoder>,
        config: PublishConfig,
    ) -> Self {
        let crossfader = Crossfader::new(config.max_fade_frames);
        Self {
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                state: Mutex::new(PublishState {
                    crossfader,
                    running: None,
                }),
            }),
            playlist: Arc::new(playlist),
            decoder,
            config,
            sink: None,
            cancel: None,
            worker: None,
        }
    }

    /// Route frames of future activations to `sink`
    pub fn attach_sink(&mut self, sink: Arc<dyn AudioSink>) {
        self.sink = Some(sink);
    }

    /// Drop the sink reference. Call after the worker has stopped.
    pub fn release_sink(&mut self) {
        self.sink = None;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Arm a new generation and spawn its worker.
    ///
    /// Any previous worker is cancelled and awaited first.
    pub async fn start(&mut self) -> Result<u64> {
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| Error::Playback("no audio track published".to_string()))?;

        self.stop_and_wait().await;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.lock().running = Some(generation);

        let cancel = CancellationToken::new();
        let worker = Worker {
            generation,
            shared: Arc::clone(&self.shared),
            playlist: Arc::clone(&self.playlist),
            decoder: Arc::clone(&self.decoder),
            sink,
            config: self.config.clone(),
            cancel: cancel.clone(),
        };
        self.worker = Some(tokio::spawn(worker.run()));
        self.cancel = Some(cancel);

        info!(generation, "Publish loop started");
        Ok(generation)
    }

    /// Cancel the current generation without waiting for its worker
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(generation) = self.shared.lock().running.take() {
            info!(generation, "Publish loop stopped");
        }
    }

    /// Cancel the current generation and wait for its worker to exit
    pub async fn stop_and_wait(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Publish worker ended abnormally: {}", e);
            }
        }
    }

    /// Begin fading out. The worker stops itself once silent.
    pub fn duck(&self) {
        let mut state = self.shared.lock();
        if state.running.is_some() {
            state.crossfader.start_fade(FadeDirection::FadeOut);
            debug!(
                frames = state.crossfader.state().frames_total,
                "Ducking ambient stream"
            );
        } else {
            state.crossfader.set_gain(0.0);
        }
    }

    /// Fade back in, restarting the worker from silence if it had stopped
    pub async fn unduck(&mut self) -> Result<()> {
        let restart = {
            let mut state = self.shared.lock();
            let restart = state.running.is_none();
            if restart {
                state.crossfader.set_gain(0.0);
            }
            state.crossfader.start_fade(FadeDirection::FadeIn);
            debug!(
                frames = state.crossfader.state().frames_total,
                restart, "Unducking ambient stream"
            );
            restart
        };
        if restart {
            self.start().await?;
        }
        Ok(())
    }

    /// Jump to a static gain, cancelling any fade
    pub fn set_gain(&self, gain: f32) {
        self.shared.lock().crossfader.set_gain(gain);
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running.is_some()
    }

    /// Most recently armed generation (0 before the first start)
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    pub fn crossfade_state(&self) -> CrossfadeState {
        self.shared.lock().crossfader.state()
    }
}

impl Drop for PublishLoop {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

enum FileOutcome {
    /// Decoded to end of stream
    Finished { frames: u64 },
    /// Given up on (decode or transport failure); playlist advances
    Abandoned { frames: u64 },
    /// Worker must exit
    Stopped,
}

enum Emit {
    Sent,
    Stop,
    Failed(Error),
}

/// One activation of the publish loop
struct Worker {
    generation: u64,
    shared: Arc<Shared>,
    playlist: Arc<PlaylistSource>,
    decoder: Arc<dyn PcmDecoder>,
    sink: Arc<dyn AudioSink>,
    config: PublishConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(generation = self.generation, "Publish worker running");
        self.play().await;

        {
            let mut state = self.shared.lock();
            if state.running == Some(self.generation) {
                state.running = None;
            }
        }
        debug!(generation = self.generation, "Publish worker exited");
    }

    async fn play(&self) {
        loop {
            let entries = self.playlist.scan().await;
            if entries.is_empty() {
                warn!(
                    "Playlist {} has no playable files, rescanning in {:?}",
                    self.playlist.dir().display(),
                    self.config.rescan_interval
                );
                if !self.pause(self.config.rescan_interval).await {
                    return;
                }
                continue;
            }

            let mut emitted = 0u64;
            for path in &entries {
                match self.stream_file(path).await {
                    FileOutcome::Finished { frames } | FileOutcome::Abandoned { frames } => {
                        emitted += frames
                    }
                    FileOutcome::Stopped => return,
                }
            }

            // Every entry failed; don't spin on a broken playlist
            if emitted == 0 {
                warn!(
                    "No audio produced from {} playlist entries, retrying in {:?}",
                    entries.len(),
                    self.config.rescan_interval
                );
                if !self.pause(self.config.rescan_interval).await {
                    return;
                }
            }
        }
    }

    /// Sleep unless cancelled first; false means stop
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn is_current(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    async fn stream_file(&self, path: &Path) -> FileOutcome {
        if !self.is_current() {
            return FileOutcome::Stopped;
        }

        let mut stream = match self.decoder.open(path).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return FileOutcome::Abandoned { frames: 0 };
            }
        };
        debug!(generation = self.generation, "Now playing {}", path.display());

        let mut slicer = FrameSlicer::new(self.config.format.bytes_per_frame());
        let mut buf = vec![0u8; self.config.read_chunk.max(1)];
        let mut frames = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = stream.read(&mut buf) => Some(result),
            };
            let n = match read {
                None => return self.abort(&mut stream, FileOutcome::Stopped).await,
                Some(Ok(0)) => break,
                Some(Ok(n)) => n,
                Some(Err(e)) => {
                    warn!("Read from decoder failed for {}: {}", path.display(), e);
                    return self
                        .abort(&mut stream, FileOutcome::Abandoned { frames })
                        .await;
                }
            };

            slicer.push(&buf[..n]);
            while let Some(bytes) = slicer.next_frame() {
                match self.emit(&bytes).await {
                    Emit::Sent => frames += 1,
                    Emit::Stop => {
                        return self.abort(&mut stream, FileOutcome::Stopped).await
                    }
                    Emit::Failed(e) => {
                        warn!(
                            "Frame submission failed during {} after {} frames: {}",
                            path.display(),
                            frames,
                            e
                        );
                        return self
                            .abort(&mut stream, FileOutcome::Abandoned { frames })
                            .await;
                    }
                }
            }
        }

        let dropped = slicer.clear();
        if dropped > 0 {
            trace!("Discarded {} trailing bytes of {}", dropped, path.display());
        }

        match stream.finish().await {
            DecodeExit::Success => debug!("Finished {} ({} frames)", path.display(), frames),
            DecodeExit::Failed { code, stderr_tail } => warn!(
                "Decoder exited with {:?} for {}: {}",
                code,
                path.display(),
                stderr_tail.join(" | ")
            ),
            DecodeExit::Killed => {}
        }
        FileOutcome::Finished { frames }
    }

    async fn abort(&self, stream: &mut Box<dyn PcmStream>, outcome: FileOutcome) -> FileOutcome {
        stream.terminate().await;
        outcome
    }

    /// Apply gain to one frame and submit it
    async fn emit(&self, bytes: &[u8]) -> Emit {
        if !self.is_current() {
            return Emit::Stop;
        }

        let mut samples = samples_from_le_bytes(bytes);
        let (step, before, applied) = {
            let mut state = self.shared.lock();
            if state.running != Some(self.generation) {
                return Emit::Stop;
            }
            let before = state.crossfader.clone();
            let step = state.crossfader.apply(&mut samples);
            (step, before, state.crossfader.state())
        };

        let frame = DecodeFrame {
            samples,
            sample_rate: self.config.format.sample_rate,
            generation: self.generation,
        };
        let submitted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.sink.capture_frame(&frame) => Some(result),
        };
        match submitted {
            None => {
                self.rewind(before, applied);
                return Emit::Stop;
            }
            Some(Err(e)) => {
                self.rewind(before, applied);
                return Emit::Failed(e);
            }
            Some(Ok(())) => {}
        }

        if step == FadeStep::FadeOutComplete && self.finish_if_silent() {
            return Emit::Stop;
        }
        if !self.is_current() {
            return Emit::Stop;
        }
        Emit::Sent
    }

    /// Give back the fade step of a frame the transport never took
    fn rewind(&self, before: Crossfader, applied: CrossfadeState) {
        let mut state = self.shared.lock();
        // A duck, unduck or set_gain since then owns the gain now
        if state.crossfader.state() == applied {
            state.crossfader = before;
        }
    }

    /// Self-stop after a completed fade-out, unless an unduck arrived since
    fn finish_if_silent(&self) -> bool {
        let mut state = self.shared.lock();
        if state.running == Some(self.generation) && state.crossfader.is_silent() {
            state.running = None;
            info!(generation = self.generation, "Faded out, publish loop stopping");
            return true;
        }
        false
    }
}
