//! Short-lived room access credentials
//!
//! A fresh credential is minted for every join attempt, so a long outage
//! never leaves the agent holding an expired token.

use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::time::Duration;

/// Token granting the agent access to one room
#[derive(Clone)]
pub struct AccessCredential {
    pub token: String,
    pub identity: String,
    pub room: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessCredential {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// Never print the token itself
impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .field("room", &self.room)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mints credentials on demand
pub trait CredentialIssuer: Send + Sync {
    fn issue(&self) -> Result<AccessCredential>;
}

/// Expiry timestamp `ttl` from now
pub(crate) fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(600));
    Utc::now() + ttl
}

/// Issuer for the loopback transport; the token is an opaque marker
#[derive(Debug, Clone)]
pub struct LoopbackIssuer {
    identity: String,
    room: String,
    ttl: Duration,
}

impl LoopbackIssuer {
    pub fn new(identity: impl Into<String>, room: impl Into<String>, ttl: Duration) -> Self {
        Self {
            identity: identity.into(),
            room: room.into(),
            ttl,
        }
    }
}

impl CredentialIssuer for LoopbackIssuer {
    fn issue(&self) -> Result<AccessCredential> {
        let expires_at = expiry_after(self.ttl);
        Ok(AccessCredential {
            token: format!("loopback:{}:{}:{}", self.room, self.identity, expires_at.timestamp()),
            identity: self.identity.clone(),
            room: self.room.clone(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_issuer_sets_future_expiry() {
        let issuer = LoopbackIssuer::new("ambient-agent", "lobby", Duration::from_secs(600));
        let credential = issuer.issue().unwrap();
        assert_eq!(credential.identity, "ambient-agent");
        assert_eq!(credential.room, "lobby");
        assert!(!credential.is_expired());
        let remaining = credential.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 590 && remaining.num_seconds() <= 600);
    }

    #[test]
    fn test_debug_redacts_token() {
        let issuer = LoopbackIssuer::new("agent", "room", Duration::from_secs(60));
        let credential = issuer.issue().unwrap();
        let printed = format!("{:?}", credential);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&credential.token));
    }
}
