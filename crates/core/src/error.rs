//! Error types for the broker domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error variant, and the protocol-facing kinds map 1:1 onto
//! the `code` field emitted in `error` / `pairing:error` wire frames.

use thiserror::Error;

/// The top-level error type for all broker operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the shared-store adapter (component C).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("value at key '{0}' could not be decoded")]
    Corrupt(String),
}

/// The protocol-facing error kinds from the wire protocol's error taxonomy.
///
/// These are emitted verbatim (via [`PairingError::code`]) as the `code`
/// field of `error` and `pairing:error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairingError {
    #[error("not authenticated")]
    Unauthorized,
    #[error("pairing code is not in XXX-XXX-XXX format")]
    InvalidFormat,
    #[error("no pairing code matches")]
    CodeNotFound,
    #[error("pairing code has expired")]
    CodeExpired,
    #[error("runner is not currently online")]
    RunnerOffline,
    #[error("too many failed pairing attempts")]
    RateLimited,
    #[error("client is not paired with a runner")]
    NotPaired,
    #[error("no such PTY session")]
    SessionNotFound,
    #[error("failed to allocate a unique pairing code")]
    CodeCollision,
    #[error("internal error")]
    Internal,
}

impl PairingError {
    /// The wire `code` string for this error (matches its serde rename).
    pub fn code(self) -> &'static str {
        match self {
            PairingError::Unauthorized => "UNAUTHORIZED",
            PairingError::InvalidFormat => "INVALID_FORMAT",
            PairingError::CodeNotFound => "CODE_NOT_FOUND",
            PairingError::CodeExpired => "CODE_EXPIRED",
            PairingError::RunnerOffline => "RUNNER_OFFLINE",
            PairingError::RateLimited => "RATE_LIMITED",
            PairingError::NotPaired => "NOT_PAIRED",
            PairingError::SessionNotFound => "SESSION_NOT_FOUND",
            PairingError::CodeCollision => "CODE_COLLISION",
            PairingError::Internal => "INTERNAL",
        }
    }
}
