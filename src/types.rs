//! Shared small value types used across actor boundaries.

use std::fmt;

/// Identifies a listener (there is exactly one in this broker, but the
/// type keeps the door open for more without touching call sites).
pub type ListenerId = u32;

/// Internal numeric handle for a TCP connection, assigned at accept time.
/// Distinct from the MQTT client-id string, which is only known once the
/// CONNECT packet has been decoded.
pub type SessionId = u64;

/// Opaque matcher/bus registration token. The source keys these as
/// `filter + ":" + clientId`; we keep the same string shape so a bug
/// report referencing a token is recognizable.
pub type Token = String;

#[must_use]
pub fn make_token(filter: &str, client_id: &str) -> Token {
    format!("{filter}:{client_id}")
}

/// A point-in-time snapshot of session metadata, attached to
/// `clientConnected`/`clientDisconnected` events (spec §6).
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub client_id: String,
    pub clean_session: bool,
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.client_id, self.session_id)
    }
}
