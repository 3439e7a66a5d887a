//! Stable identities used across the pairing and session engine.
//!
//! `ClientToken` is the one identity that must survive a socket reconnect —
//! every other identifier (socket ids, session ids) is scoped to a single
//! connection or a single PTY session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A runner's stable identifier, chosen by its operator at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunnerId(pub String);

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The app's stable identity, supplied in the WebSocket handshake `auth`
/// object and held constant across reconnects.
///
/// Pairing state (component E) is keyed by this value, never by a socket
/// id — socket ids die with the connection, `ClientToken` does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientToken(pub String);

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl ClientToken {
    /// Whether this token was supplied by the client, as opposed to a
    /// fallback socket-id-derived value the app never asked for.
    ///
    /// Tokens produced by [`ClientToken::from_socket_id`] are prefixed so
    /// the gateway can warn that such a client cannot survive reconnection.
    pub fn is_resumable(&self) -> bool {
        !self.0.starts_with(SOCKET_FALLBACK_PREFIX)
    }

    /// Build a non-resumable fallback token from an ephemeral socket id, for
    /// apps that omit `clientToken` from their handshake `auth` payload.
    pub fn from_socket_id(socket_id: &str) -> Self {
        Self(format!("{SOCKET_FALLBACK_PREFIX}{socket_id}"))
    }
}

const SOCKET_FALLBACK_PREFIX: &str = "socket:";

/// The identity resolved from a validated app bearer token (component A).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub subject_id: String,
}

/// One entry of the runner credential table loaded from configuration:
/// `runnerId -> secret`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerCredential {
    pub runner_id: RunnerId,
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_fallback_token_is_not_resumable() {
        let t = ClientToken::from_socket_id("abc123");
        assert!(!t.is_resumable());
    }

    #[test]
    fn client_supplied_token_is_resumable() {
        let t = ClientToken::from("stable-token-1");
        assert!(t.is_resumable());
    }

    #[test]
    fn runner_id_displays_inner_string() {
        let id = RunnerId::from("R1");
        assert_eq!(id.to_string(), "R1");
    }
}
