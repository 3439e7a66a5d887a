//! Credential validator (component A).
//!
//! Checks runner `{id, secret}` pairs against a static table loaded from
//! configuration, and validates app bearer tokens issued by
//! [`crate::app_token`]. Neither path performs network I/O.

use pairwire_core::{AppIdentity, RunnerId};
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::app_token::{self, AppTokenError};

/// Validates runner credentials and app bearer tokens.
pub struct CredentialValidator {
    runner_secrets: HashMap<RunnerId, String>,
    app_token_secret: String,
}

impl CredentialValidator {
    pub fn new(runner_secrets: HashMap<RunnerId, String>, app_token_secret: String) -> Self {
        Self {
            runner_secrets,
            app_token_secret,
        }
    }

    /// `true` iff `runner_id` is in the configured table and `secret`
    /// matches its value, compared in constant time to avoid leaking how
    /// many leading bytes matched.
    pub fn validate_runner(&self, runner_id: &RunnerId, secret: &str) -> bool {
        match self.runner_secrets.get(runner_id) {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(secret.as_bytes())),
            None => false,
        }
    }

    /// Validate a signed app bearer token. Returns the resolved identity on
    /// success; any parse, signature, or expiry failure is folded into a
    /// single not-authenticated outcome so callers cannot distinguish *why*
    /// a token failed (the wire protocol only ever reports `UNAUTHORIZED`).
    pub fn validate_app_token(&self, token: &str) -> Option<AppIdentity> {
        match app_token::verify(token, self.app_token_secret.as_bytes()) {
            Ok(claims) => Some(AppIdentity {
                subject_id: claims.subject_id,
            }),
            Err(AppTokenError::Malformed | AppTokenError::BadSignature | AppTokenError::Expired) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CredentialValidator {
        let mut secrets = HashMap::new();
        secrets.insert(RunnerId::from("R1"), "correct-horse".to_string());
        CredentialValidator::new(secrets, "app-secret".into())
    }

    #[test]
    fn accepts_matching_runner_credential() {
        let v = validator();
        assert!(v.validate_runner(&RunnerId::from("R1"), "correct-horse"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let v = validator();
        assert!(!v.validate_runner(&RunnerId::from("R1"), "wrong"));
    }

    #[test]
    fn rejects_unknown_runner() {
        let v = validator();
        assert!(!v.validate_runner(&RunnerId::from("R2"), "correct-horse"));
    }

    #[test]
    fn app_token_round_trips() {
        let v = validator();
        let token = app_token::issue("user-1", "app-secret".as_bytes(), std::time::Duration::from_secs(3600));
        let identity = v.validate_app_token(&token).expect("token should validate");
        assert_eq!(identity.subject_id, "user-1");
    }

    #[test]
    fn app_token_wrong_secret_is_rejected() {
        let v = validator();
        let token = app_token::issue("user-1", b"some-other-secret", std::time::Duration::from_secs(3600));
        assert!(v.validate_app_token(&token).is_none());
    }
}
