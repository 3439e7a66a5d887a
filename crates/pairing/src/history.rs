//! Pairing history (component G).
//!
//! Append-only, capped log per runner of pairing lifecycle events. Failures
//! here never block a pairing operation — callers log a warning and move
//! on rather than propagating the error.

use pairwire_core::{RunnerId, StoreError};
use pairwire_core::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Paired,
    Unpaired,
    RunnerDisconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub app_client_token: String,
    pub action: HistoryAction,
    pub timestamp: i64,
}

pub struct PairingHistory {
    store: Arc<dyn Store>,
    capacity: usize,
}

impl PairingHistory {
    pub fn new(store: Arc<dyn Store>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    pub async fn record(
        &self,
        runner_id: &RunnerId,
        client_token: &str,
        action: HistoryAction,
    ) -> Result<(), StoreError> {
        let entry = HistoryEntry {
            app_client_token: client_token.to_string(),
            action,
            timestamp: now_millis(),
        };
        let json = serde_json::to_string(&entry).map_err(|_| StoreError::Corrupt(runner_id.to_string()))?;
        self.store.l_push(&history_key(runner_id), &json).await?;
        self.store.l_trim(&history_key(runner_id), self.capacity).await
    }

    pub async fn get_history(
        &self,
        runner_id: &RunnerId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let raw = self.store.l_range(&history_key(runner_id), limit).await?;
        Ok(raw
            .into_iter()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }
}

fn history_key(runner_id: &RunnerId) -> String {
    format!("pairing:history:{runner_id}")
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

    fn history() -> PairingHistory {
        PairingHistory::new(Arc::new(InMemoryStore::new()), DEFAULT_HISTORY_CAPACITY)
    }

    #[tokio::test]
    async fn record_and_read_most_recent_first() {
        let h = history();
        let runner_id = RunnerId::from("R1");
        h.record(&runner_id, "T1", HistoryAction::Paired).await.unwrap();
        h.record(&runner_id, "T1", HistoryAction::Unpaired).await.unwrap();

        let entries = h.get_history(&runner_id, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, HistoryAction::Unpaired);
        assert_eq!(entries[1].action, HistoryAction::Paired);
    }

    #[tokio::test]
    async fn history_caps_at_capacity() {
        let h = history();
        let runner_id = RunnerId::from("R1");
        for _ in 0..(DEFAULT_HISTORY_CAPACITY + 10) {
            h.record(&runner_id, "T1", HistoryAction::Paired).await.unwrap();
        }
        let entries = h.get_history(&runner_id, DEFAULT_HISTORY_CAPACITY + 50).await.unwrap();
        assert_eq!(entries.len(), DEFAULT_HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn empty_history_for_unknown_runner() {
        let h = history();
        let entries = h.get_history(&RunnerId::from("R404"), 10).await.unwrap();
        assert!(entries.is_empty());
    }
}
