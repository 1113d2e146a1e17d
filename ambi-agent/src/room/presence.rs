//! Live broadcaster presence
//!
//! Tracks whether the one well-known beacon identity is in the room. Join and
//! leave events update it incrementally; every (re)connect re-derives it from
//! the full membership snapshot, because events may have been missed while
//! the connection was down.

use super::RoomEvent;
use tracing::info;

/// Transition of the beacon's presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Arrived,
    Departed,
}

impl PresenceChange {
    pub fn is_present(self) -> bool {
        matches!(self, PresenceChange::Arrived)
    }
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    beacon_identity: String,
    present: bool,
}

impl PresenceTracker {
    pub fn new(beacon_identity: impl Into<String>) -> Self {
        Self {
            beacon_identity: beacon_identity.into(),
            present: false,
        }
    }

    pub fn beacon_identity(&self) -> &str {
        &self.beacon_identity
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Replace presence with what a full membership snapshot says
    pub fn resync<S: AsRef<str>>(&mut self, members: &[S]) -> bool {
        self.present = members
            .iter()
            .any(|m| m.as_ref() == self.beacon_identity);
        info!(
            "Presence resync: beacon '{}' {}",
            self.beacon_identity,
            if self.present { "present" } else { "absent" }
        );
        self.present
    }

    /// Apply one room event; returns a change only on a real transition
    pub fn observe(&mut self, event: &RoomEvent) -> Option<PresenceChange> {
        match event {
            RoomEvent::ParticipantJoined(identity) if *identity == self.beacon_identity => {
                if self.present {
                    return None;
                }
                self.present = true;
                info!("Beacon '{}' joined", identity);
                Some(PresenceChange::Arrived)
            }
            RoomEvent::ParticipantLeft(identity) if *identity == self.beacon_identity => {
                if !self.present {
                    return None;
                }
                self.present = false;
                info!("Beacon '{}' left", identity);
                Some(PresenceChange::Departed)
            }
            _ => None,
        }
    }
}
