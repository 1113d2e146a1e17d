//! Subprocess audio decoder
//!
//! Each playlist file is decoded by an external tool (ffmpeg by default) that
//! writes raw signed 16-bit little-endian mono PCM at the fixed sample rate
//! to stdout. Stderr is treated as log text: every line is logged at debug and
//! the last few are kept for the warning on a failed exit.
//!
//! # Process lifetime
//!
//! The child is always reaped:
//! - cancellation and downstream failure go through [`PcmStream::terminate`]
//! - natural end of stream goes through [`PcmStream::finish`]
//! - anything else (panic, early return) is covered by `kill_on_drop`

use crate::audio::types::{FrameFormat, CHANNELS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Stderr lines kept for diagnostics after a failed decode
const STDERR_TAIL_LINES: usize = 8;

/// How a decode process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeExit {
    /// Exited with status 0
    Success,
    /// Exited with a non-zero status (or by signal, `code == None`)
    Failed {
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },
    /// Terminated by us
    Killed,
}

/// Opens decode streams for playlist entries
#[async_trait]
pub trait PcmDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn PcmStream>>;
}

/// A running decode, read as a raw byte stream
#[async_trait]
pub trait PcmStream: Send {
    /// Read decoded bytes into `buf`; `Ok(0)` marks end of stream
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Kill the decoder and reap it. Calling twice is harmless.
    async fn terminate(&mut self);

    /// Wait for the decoder to exit after end of stream
    async fn finish(&mut self) -> DecodeExit;
}

/// Locate the decode tool on PATH (fatal configuration error if absent)
pub fn resolve_decoder(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        Error::Config(format!("Decode tool '{}' not found on PATH: {}", program, e))
    })
}

/// ffmpeg-backed decoder
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: PathBuf,
    format: FrameFormat,
}

impl FfmpegDecoder {
    pub fn new(program: impl Into<PathBuf>, format: FrameFormat) -> Self {
        Self {
            program: program.into(),
            format,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments selecting raw mono s16le at the fixed rate on stdout
    pub fn args_for(&self, path: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-ar".to_string(),
            self.format.sample_rate.to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl PcmDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn PcmStream>> {
        let mut child = Command::new(&self.program)
            .args(self.args_for(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::decode(path, format!("failed to spawn decoder: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::decode(path, "decoder stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::decode(path, "decoder stderr not captured"))?;

        debug!(
            "Spawned decoder pid={:?} for {}",
            child.id(),
            path.display()
        );

        Ok(Box::new(FfmpegStream {
            path: path.to_path_buf(),
            child,
            stdout,
            stderr_task: Some(spawn_stderr_collector(path.to_path_buf(), stderr)),
            terminated: false,
        }))
    }
}

/// Log every stderr line and keep the last few
fn spawn_stderr_collector(path: PathBuf, stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("decoder [{}]: {}", path.display(), line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

struct FfmpegStream {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<Vec<String>>>,
    terminated: bool,
}

impl FfmpegStream {
    async fn stderr_tail(&mut self) -> Vec<String> {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl PcmStream for FfmpegStream {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf).await
    }

    async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        // kill() also waits, so the child never lingers as a zombie
        if let Err(e) = self.child.kill().await {
            trace!("Decoder for {} already gone: {}", self.path.display(), e);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }

    async fn finish(&mut self) -> DecodeExit {
        if self.terminated {
            return DecodeExit::Killed;
        }
        self.terminated = true;
        match self.child.wait().await {
            Ok(status) if status.success() => {
                self.stderr_tail().await;
                DecodeExit::Success
            }
            Ok(status) => DecodeExit::Failed {
                code: status.code(),
                stderr_tail: self.stderr_tail().await,
            },
            Err(e) => DecodeExit::Failed {
                code: None,
                stderr_tail: vec![format!("wait failed: {}", e)],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_select_raw_mono_pcm_at_fixed_rate() {
        let decoder = FfmpegDecoder::new("ffmpeg", FrameFormat::new(48_000, 20));
        let args = decoder.args_for(Path::new("/music/01 intro.mp3"));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-i") + 1], "/music/01 intro.mp3");
        assert_eq!(args[pos("-f") + 1], "s16le");
        assert_eq!(args[pos("-ac") + 1], "1");
        assert_eq!(args[pos("-ar") + 1], "48000");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_missing_decode_tool_is_config_error() {
        let result = resolve_decoder("definitely-not-a-real-decoder-binary-4f1c");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_decode_error() {
        let decoder = FfmpegDecoder::new(
            "/nonexistent/bin/decoder",
            FrameFormat::default(),
        );
        let result = decoder.open(Path::new("/music/a.mp3")).await;
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    /// Stand-in decode tool: a shell script that ignores its arguments
    #[cfg(target_os = "linux")]
    fn fake_decoder(dir: &tempfile::TempDir, body: &str) -> FfmpegDecoder {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegDecoder::new(script, FrameFormat::default())
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_terminate_kills_and_reaps_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let decoder = fake_decoder(
            &dir,
            &format!("echo $$ > '{}'\nexec cat /dev/zero", pid_file.display()),
        );

        let mut stream = decoder.open(Path::new("/music/endless.mp3")).await.unwrap();
        let mut buf = vec![0u8; 1000];
        let mut got = 0;
        while got < 4000 {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "decoder output ended early");
            got += n;
        }

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let proc_entry = PathBuf::from(format!("/proc/{}", pid));
        assert!(proc_entry.exists());

        stream.terminate().await;
        assert!(!proc_entry.exists(), "decoder still alive after terminate");
        assert_eq!(stream.finish().await, DecodeExit::Killed);

        // Second terminate is a no-op
        stream.terminate().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_exit_reports_code_and_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let decoder = fake_decoder(
            &dir,
            "echo 'Invalid data found when processing input' >&2\nexit 3",
        );

        let mut stream = decoder.open(Path::new("/music/corrupt.mp3")).await.unwrap();
        let mut buf = vec![0u8; 1000];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        match stream.finish().await {
            DecodeExit::Failed { code, stderr_tail } => {
                assert_eq!(code, Some(3));
                assert!(stderr_tail
                    .iter()
                    .any(|l| l.contains("Invalid data found when processing input")));
            }
            other => panic!("expected failed exit, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_natural_end_is_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let decoder = fake_decoder(&dir, "head -c 960 /dev/zero");

        let mut stream = decoder.open(Path::new("/music/short.mp3")).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let mut total = 0;
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 960);
        assert_eq!(stream.finish().await, DecodeExit::Success);
    }
}
