//! Pairing-session registry (component E).
//!
//! The durable `(appClientToken, runnerId)` relationship that authorizes PTY
//! session requests, plus runner liveness via heartbeat. Keyed throughout by
//! [`ClientToken`], never by a socket id — this is what lets an app's
//! pairing survive a socket reconnect.

use pairwire_core::{ClientToken, PairingError, RunnerId, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

pub const DEFAULT_HEARTBEAT_ONLINE_GRACE: Duration = Duration::from_secs(30);

/// Ten years — long enough to outlive any broker process, short enough not
/// to risk overflow when a `Store` implementation adds it to a clock.
const NO_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSession {
    pub client_token: String,
    pub runner_id: String,
    pub paired_at: i64,
    pub is_active: bool,
}

pub struct SessionRegistry {
    store: Arc<dyn Store>,
    heartbeat_ttl: Duration,
    heartbeat_online_grace: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn Store>, heartbeat_ttl: Duration, heartbeat_online_grace: Duration) -> Self {
        Self {
            store,
            heartbeat_ttl,
            heartbeat_online_grace,
        }
    }

    /// Create (or overwrite, for a re-pair) the session for `client_token`.
    pub async fn create_session(
        &self,
        client_token: &ClientToken,
        runner_id: &RunnerId,
    ) -> Result<(), PairingError> {
        let session = PairingSession {
            client_token: client_token.to_string(),
            runner_id: runner_id.to_string(),
            paired_at: now_millis(),
            is_active: true,
        };
        let json = serde_json::to_string(&session).map_err(|_| PairingError::Internal)?;

        // A session key has no TTL of its own — it is preserved across app
        // disconnects and is only removed explicitly. `Store` requires a
        // TTL on every write, so we pass one long enough to outlive any
        // broker process instead of modeling "never expires" specially.
        self.store
            .set_with_ttl(&session_key(client_token), &json, NO_EXPIRY)
            .await
            .map_err(|_| PairingError::Internal)?;
        self.store
            .s_add(&apps_key(runner_id), &client_token.to_string())
            .await
            .map_err(|_| PairingError::Internal)?;

        info!(client_token = %client_token, runner_id = %runner_id, "created pairing session");
        Ok(())
    }

    pub async fn get_session(
        &self,
        client_token: &ClientToken,
    ) -> Result<Option<PairingSession>, PairingError> {
        let raw = self
            .store
            .get(&session_key(client_token))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let session: PairingSession =
            serde_json::from_str(&raw).map_err(|_| PairingError::Internal)?;
        Ok(Some(session))
    }

    /// Idempotent on a missing record: tolerates a session key that exists
    /// without its mirror app-set entry, or vice versa.
    pub async fn remove_session(&self, client_token: &ClientToken) -> Result<(), PairingError> {
        if let Some(session) = self.get_session(client_token).await? {
            let runner_id = RunnerId::from(session.runner_id);
            self.store
                .s_rem(&apps_key(&runner_id), &client_token.to_string())
                .await
                .map_err(|_| PairingError::Internal)?;
        }
        self.store
            .del(&[&session_key(client_token)])
            .await
            .map_err(|_| PairingError::Internal)?;
        Ok(())
    }

    pub async fn get_apps_by_runner_id(
        &self,
        runner_id: &RunnerId,
    ) -> Result<Vec<ClientToken>, PairingError> {
        let members = self
            .store
            .s_members(&apps_key(runner_id))
            .await
            .map_err(|_| PairingError::Internal)?;
        Ok(members.into_iter().map(ClientToken::from).collect())
    }

    pub async fn is_runner_online(&self, runner_id: &RunnerId) -> Result<bool, PairingError> {
        let raw = self
            .store
            .get(&heartbeat_key(runner_id))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let last_beat: i64 = raw.parse().map_err(|_| PairingError::Internal)?;
        let age_ms = now_millis() - last_beat;
        Ok(age_ms < self.heartbeat_online_grace.as_millis() as i64)
    }

    pub async fn update_heartbeat(&self, runner_id: &RunnerId) -> Result<(), PairingError> {
        self.store
            .set_with_ttl(&heartbeat_key(runner_id), &now_millis().to_string(), self.heartbeat_ttl)
            .await
            .map_err(|_| PairingError::Internal)
    }

    /// Tear down every session attached to `runner_id` and return the
    /// tokens that were removed, for the caller to notify.
    pub async fn remove_all_sessions_for_runner(
        &self,
        runner_id: &RunnerId,
    ) -> Result<Vec<ClientToken>, PairingError> {
        let tokens = self.get_apps_by_runner_id(runner_id).await?;
        for token in &tokens {
            self.store
                .del(&[&session_key(token)])
                .await
                .map_err(|_| PairingError::Internal)?;
        }
        self.store
            .del(&[&apps_key(runner_id)])
            .await
            .map_err(|_| PairingError::Internal)?;
        Ok(tokens)
    }
}

fn session_key(client_token: &ClientToken) -> String {
    format!("pairing:session:{client_token}")
}

fn apps_key(runner_id: &RunnerId) -> String {
    format!("pairing:apps:{runner_id}")
}

fn heartbeat_key(runner_id: &RunnerId) -> String {
    format!("runner:heartbeat:{runner_id}")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairwire_store_memory::InMemoryStore;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(InMemoryStore::new()),
            Duration::from_secs(60),
            DEFAULT_HEARTBEAT_ONLINE_GRACE,
        )
    }

    #[tokio::test]
    async fn create_and_get_session_round_trips() {
        let reg = registry();
        let token = ClientToken::from("T1");
        let runner_id = RunnerId::from("R1");
        reg.create_session(&token, &runner_id).await.unwrap();

        let session = reg.get_session(&token).await.unwrap().unwrap();
        assert_eq!(session.runner_id, "R1");
        assert_eq!(reg.get_apps_by_runner_id(&runner_id).await.unwrap(), vec![token]);
    }

    #[tokio::test]
    async fn remove_session_is_idempotent() {
        let reg = registry();
        let token = ClientToken::from("T1");
        let runner_id = RunnerId::from("R1");
        reg.create_session(&token, &runner_id).await.unwrap();

        reg.remove_session(&token).await.unwrap();
        reg.remove_session(&token).await.unwrap();
        assert!(reg.get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn heartbeat_determines_online_status() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        assert!(!reg.is_runner_online(&runner_id).await.unwrap());

        reg.update_heartbeat(&runner_id).await.unwrap();
        assert!(reg.is_runner_online(&runner_id).await.unwrap());
    }

    #[tokio::test]
    async fn repeated_heartbeat_keeps_runner_online() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        reg.update_heartbeat(&runner_id).await.unwrap();
        reg.update_heartbeat(&runner_id).await.unwrap();
        assert!(reg.is_runner_online(&runner_id).await.unwrap());
    }

    #[tokio::test]
    async fn remove_all_sessions_for_runner_returns_tokens() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        reg.create_session(&ClientToken::from("T1"), &runner_id).await.unwrap();
        reg.create_session(&ClientToken::from("T2"), &runner_id).await.unwrap();

        let mut removed = reg.remove_all_sessions_for_runner(&runner_id).await.unwrap();
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(removed, vec![ClientToken::from("T1"), ClientToken::from("T2")]);
        assert!(reg.get_session(&ClientToken::from("T1")).await.unwrap().is_none());
        assert!(reg.get_apps_by_runner_id(&runner_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn re_pair_overwrites_existing_session() {
        let reg = registry();
        let token = ClientToken::from("T1");
        reg.create_session(&token, &RunnerId::from("R1")).await.unwrap();
        reg.create_session(&token, &RunnerId::from("R2")).await.unwrap();

        let session = reg.get_session(&token).await.unwrap().unwrap();
        assert_eq!(session.runner_id, "R2");
    }
}
