//! Room transport driven by a test script
//!
//! Each connect attempt consumes the next scripted outcome; an exhausted
//! script fails every further attempt. Joined sessions publish into one shared
//! sink, and the test injects room events into the newest session.

use super::RecordingSink;
use ambi_agent::audio::types::FrameFormat;
use ambi_agent::error::{Error, Result};
use ambi_agent::room::{
    AccessCredential, AudioSink, JoinOptions, RoomConnector, RoomEvent, RoomHandle, RoomSession,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub enum JoinOutcome {
    Fail,
    Join { members: Vec<String> },
}

impl JoinOutcome {
    pub fn empty_room() -> Self {
        JoinOutcome::Join {
            members: Vec::new(),
        }
    }

    pub fn with_members(members: &[&str]) -> Self {
        JoinOutcome::Join {
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

pub struct ScriptedConnector {
    script: Mutex<VecDeque<JoinOutcome>>,
    sink: Arc<RecordingSink>,
    attempts: Mutex<Vec<Instant>>,
    sessions: Mutex<Vec<mpsc::UnboundedSender<RoomEvent>>>,
    leaves: Arc<AtomicUsize>,
    shutdowns: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Vec<JoinOutcome>, sink: Arc<RecordingSink>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            sink,
            attempts: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            leaves: Arc::new(AtomicUsize::new(0)),
            shutdowns: AtomicUsize::new(0),
        })
    }

    /// When each connect attempt happened
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Deliver an event to the most recent session
    pub fn send(&self, event: RoomEvent) {
        let sessions = self.sessions.lock().unwrap();
        let tx = sessions.last().expect("no session joined yet");
        tx.send(event).expect("session event channel closed");
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomConnector for ScriptedConnector {
    async fn connect(
        &self,
        _options: &JoinOptions,
        _credential: &AccessCredential,
    ) -> Result<RoomSession> {
        self.attempts.lock().unwrap().push(Instant::now());
        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(JoinOutcome::Join { members }) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.sessions.lock().unwrap().push(tx);
                Ok(RoomSession {
                    handle: Box::new(ScriptedHandle {
                        sink: Arc::clone(&self.sink),
                        leaves: Arc::clone(&self.leaves),
                    }),
                    members,
                    events: rx,
                })
            }
            Some(JoinOutcome::Fail) | None => {
                Err(Error::Transport("scripted join failure".to_string()))
            }
        }
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedHandle {
    sink: Arc<RecordingSink>,
    leaves: Arc<AtomicUsize>,
}

#[async_trait]
impl RoomHandle for ScriptedHandle {
    async fn publish_audio(&self, _format: FrameFormat) -> Result<Arc<dyn AudioSink>> {
        Ok(self.sink.clone())
    }

    async fn unpublish_audio(&self) -> Result<()> {
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
