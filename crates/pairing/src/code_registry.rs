//! Pairing-code registry (component D).
//!
//! Binds a short-lived code to a runner, backed purely by
//! [`pairwire_core::Store`]. At most one active code exists per runner and
//! per code string, enforced by the `pairing:code-by-runner:{runnerId}`
//! mirror key and the store's atomic create-if-absent primitive.

use pairwire_core::{PairingError, RunnerId, Store};
use pairwire_security::pairing_code;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const MAX_GENERATION_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodeEntry {
    runner_id: String,
    created_at: i64,
    expires_at: i64,
    usage_count: u64,
}

/// Pairing-code registry keyed by the shared store.
pub struct CodeRegistry {
    store: Arc<dyn Store>,
    code_ttl: Duration,
}

impl CodeRegistry {
    pub fn new(store: Arc<dyn Store>, code_ttl: Duration) -> Self {
        Self { store, code_ttl }
    }

    /// Generate a fresh code for `runner_id`, retrying on collision up to
    /// [`MAX_GENERATION_ATTEMPTS`] times.
    pub async fn register_code(&self, runner_id: &RunnerId) -> Result<String, PairingError> {
        let now = now_millis();
        let expires_at = now + self.code_ttl.as_millis() as i64;

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let code = pairing_code::generate();
            let entry = CodeEntry {
                runner_id: runner_id.to_string(),
                created_at: now,
                expires_at,
                usage_count: 0,
            };
            let json = serde_json::to_string(&entry).map_err(|_| PairingError::Internal)?;

            let created = self
                .store
                .set_if_absent_with_ttl(&code_key(&code), &json, self.code_ttl)
                .await
                .map_err(|_| PairingError::Internal)?;

            if !created {
                warn!(attempt, "pairing code collided, retrying");
                continue;
            }

            self.store
                .set_with_ttl(&code_by_runner_key(runner_id), &code, self.code_ttl)
                .await
                .map_err(|_| PairingError::Internal)?;

            info!(runner_id = %runner_id, %code, "registered pairing code");
            return Ok(code);
        }

        Err(PairingError::CodeCollision)
    }

    /// Resolve a code to its runner, without consuming it.
    pub async fn validate_code(&self, code: &str) -> Result<Option<RunnerId>, PairingError> {
        let raw = self
            .store
            .get(&code_key(code))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: CodeEntry = serde_json::from_str(&raw).map_err(|_| PairingError::Internal)?;
        Ok(Some(RunnerId::from(entry.runner_id)))
    }

    /// Advisory usage counter; never gates validity.
    pub async fn increment_usage_count(&self, code: &str) -> Result<(), PairingError> {
        let raw = self
            .store
            .get(&code_key(code))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(());
        };
        let mut entry: CodeEntry = serde_json::from_str(&raw).map_err(|_| PairingError::Internal)?;
        entry.usage_count += 1;

        let remaining = (entry.expires_at - now_millis()).max(0) as u64;
        let json = serde_json::to_string(&entry).map_err(|_| PairingError::Internal)?;
        self.store
            .set_with_ttl(&code_key(code), &json, Duration::from_millis(remaining))
            .await
            .map_err(|_| PairingError::Internal)?;
        Ok(())
    }

    pub async fn find_code_by_runner_id(
        &self,
        runner_id: &RunnerId,
    ) -> Result<Option<String>, PairingError> {
        self.store
            .get(&code_by_runner_key(runner_id))
            .await
            .map_err(|_| PairingError::Internal)
    }

    /// Delete both directions of a code's binding.
    pub async fn invalidate_code(&self, code: &str) -> Result<(), PairingError> {
        let runner_id = self.validate_code(code).await?;
        let code_key = code_key(code);
        self.store
            .del(&[&code_key])
            .await
            .map_err(|_| PairingError::Internal)?;
        if let Some(runner_id) = runner_id {
            self.store
                .del(&[&code_by_runner_key(&runner_id)])
                .await
                .map_err(|_| PairingError::Internal)?;
        }
        Ok(())
    }
}

fn code_key(code: &str) -> String {
    format!("pairing:code:{code}")
}

fn code_by_runner_key(runner_id: &RunnerId) -> String {
    format!("pairing:code-by-runner:{runner_id}")
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

    fn registry() -> CodeRegistry {
        CodeRegistry::new(Arc::new(InMemoryStore::new()), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn register_and_validate_round_trips() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        let code = reg.register_code(&runner_id).await.unwrap();
        assert!(pairing_code::validate(&code));

        let resolved = reg.validate_code(&code).await.unwrap();
        assert_eq!(resolved, Some(runner_id));
    }

    #[tokio::test]
    async fn validate_unknown_code_is_absent() {
        let reg = registry();
        assert_eq!(reg.validate_code("ZZZ-ZZZ-ZZZ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_code_by_runner_id_round_trips() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        let code = reg.register_code(&runner_id).await.unwrap();
        assert_eq!(reg.find_code_by_runner_id(&runner_id).await.unwrap(), Some(code));
    }

    #[tokio::test]
    async fn validating_a_code_does_not_consume_it() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        let code = reg.register_code(&runner_id).await.unwrap();
        reg.validate_code(&code).await.unwrap();
        reg.validate_code(&code).await.unwrap();
        assert!(reg.validate_code(&code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_removes_both_directions() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        let code = reg.register_code(&runner_id).await.unwrap();
        reg.invalidate_code(&code).await.unwrap();

        assert_eq!(reg.validate_code(&code).await.unwrap(), None);
        assert_eq!(reg.find_code_by_runner_id(&runner_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn usage_count_increments_without_affecting_validity() {
        let reg = registry();
        let runner_id = RunnerId::from("R1");
        let code = reg.register_code(&runner_id).await.unwrap();
        reg.increment_usage_count(&code).await.unwrap();
        reg.increment_usage_count(&code).await.unwrap();
        assert!(reg.validate_code(&code).await.unwrap().is_some());
    }
}
