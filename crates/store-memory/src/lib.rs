//! An in-process implementation of [`pairwire_core::Store`].
//!
//! Useful for a single-instance deployment and for tests; a networked store
//! satisfying the same trait (e.g. backed by Redis) can replace this
//! wholesale because every consumer — the pairing-code registry, the
//! session registry, the rate limiter, the pairing history — is written
//! purely against the trait.
//!
//! Modeled on this workspace's existing in-memory backend pattern: plain
//! `tokio::sync::RwLock`-guarded collections behind `Arc`, with correctness
//! guaranteed by checking expiry on every read rather than relying solely
//! on the background reaper to keep state consistent.

use async_trait::async_trait;
use pairwire_core::{Store, StoreError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// How often the background reaper sweeps for expired string keys. Lazy
/// expiry on read already guarantees correctness; this just bounds memory
/// held by keys nobody ever reads again (e.g. a pairing code nobody
/// retries).
const REAP_INTERVAL: Duration = Duration::from_secs(30);

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

#[derive(Default)]
struct State {
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, HashSet<String>>,
    // member -> score, per sorted-set key
    zsets: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// In-memory [`Store`] with a background TTL reaper.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Create a new store and spawn its background TTL reaper.
    pub fn new() -> Self {
        let state = Arc::new(RwLock::new(State::default()));
        spawn_reaper(state.clone());
        Self { state }
    }

    /// Number of live (non-expired) string keys — used by tests and the
    /// `status` CLI command.
    pub async fn string_key_count(&self) -> usize {
        let state = self.state.read().await;
        state.strings.values().filter(|e| !e.is_expired()).count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reaper(state: Arc<RwLock<State>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            let mut guard = state.write().await;
            let before = guard.strings.len();
            guard.strings.retain(|_, entry| !entry.is_expired());
            let reaped = before - guard.strings.len();
            if reaped > 0 {
                debug!(reaped, "in-memory store reaped expired keys");
            }
        }
    });
}

#[async_trait]
impl Store for InMemoryStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let absent = match state.strings.get(key) {
            Some(entry) => entry.is_expired(),
            None => true,
        };
        if absent {
            state.strings.insert(
                key.to_string(),
                StringEntry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        }
        Ok(absent)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.read().await;
        match state.strings.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn del(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for key in keys {
            state.strings.remove(*key);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.strings.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn s_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn s_rem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(set) = state.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                state.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn s_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn z_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn z_rem_by_score(&self, key: &str, min: f64, max: f64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(zset) = state.zsets.get_mut(key) {
            zset.retain(|_, score| !(*score >= min && *score <= max));
            if zset.is_empty() {
                state.zsets.remove(key);
            }
        }
        Ok(())
    }

    async fn z_count(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .zsets
            .get(key)
            .map(|zset| zset.values().filter(|s| **s >= min && **s <= max).count() as u64)
            .unwrap_or(0))
    }

    async fn l_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn l_trim(&self, key: &str, len: usize) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(list) = state.lists.get_mut(key) {
            list.truncate(len);
        }
        Ok(())
    }

    async fn l_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn set_if_absent_only_succeeds_once() {
        let store = InMemoryStore::new();
        assert!(store.set_if_absent_with_ttl("k", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".into()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", "v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_true_after_expiry() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", "v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.set_if_absent_with_ttl("k", "v2", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn set_operations() {
        let store = InMemoryStore::new();
        store.s_add("s", "a").await.unwrap();
        store.s_add("s", "b").await.unwrap();
        let mut members = store.s_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        store.s_rem("s", "a").await.unwrap();
        assert_eq!(store.s_members("s").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn sorted_set_range_and_removal() {
        let store = InMemoryStore::new();
        store.z_add("z", "one", 1.0).await.unwrap();
        store.z_add("z", "two", 2.0).await.unwrap();
        store.z_add("z", "three", 3.0).await.unwrap();

        assert_eq!(store.z_count("z", 0.0, 2.0).await.unwrap(), 2);
        store.z_rem_by_score("z", 0.0, 1.5).await.unwrap();
        assert_eq!(store.z_count("z", 0.0, 10.0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_push_trim_range() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.l_push("l", &i.to_string()).await.unwrap();
        }
        // most-recently-pushed first
        assert_eq!(
            store.l_range("l", 3).await.unwrap(),
            vec!["4".to_string(), "3".to_string(), "2".to_string()]
        );
        store.l_trim("l", 2).await.unwrap();
        assert_eq!(store.l_range("l", 10).await.unwrap(), vec!["4".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn del_removes_multiple_keys() {
        let store = InMemoryStore::new();
        store.set_with_ttl("a", "1", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl("b", "2", Duration::from_secs(60)).await.unwrap();
        store.del(&["a", "b"]).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
