//! The shared-store adapter contract (component C).
//!
//! Every higher-level pairing component (the code registry, the session
//! registry, the rate limiter, the pairing history) is written purely
//! against this trait. The reference implementation
//! (`pairwire-store-memory`) is an in-process store; a networked store
//! (Redis or similar) satisfying the same primitives can be swapped in
//! without touching any of D–G, which is the point of drawing the boundary
//! here instead of letting each component own its storage directly.
//!
//! All operations are async because a networked implementation must be
//! able to suspend; callers must never hold a lock across one of these
//! calls (see the concurrency model in the specification).

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// A typed operations surface over an external key/value store supporting
/// strings, sets, sorted sets, lists, TTL, and atomic create-if-absent.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `value` at `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically create `key` with `value` and `ttl` iff it was absent.
    /// Returns `true` iff the write happened.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Read the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove the given keys. Never errors on a missing key.
    async fn del(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Reset the TTL on `key` without changing its value.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Add `member` to the unordered set at `key`.
    async fn s_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the unordered set at `key`.
    async fn s_rem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// All members of the unordered set at `key` (empty if absent).
    async fn s_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Add `member` to the sorted set at `key` with the given `score`
    /// (conventionally a unix-millis timestamp).
    async fn z_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Remove every member of the sorted set at `key` whose score falls in
    /// `[min, max]`.
    async fn z_rem_by_score(&self, key: &str, min: f64, max: f64) -> Result<(), StoreError>;

    /// Count members of the sorted set at `key` whose score falls in
    /// `[min, max]`.
    async fn z_count(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError>;

    /// Push `value` onto the head of the list at `key`.
    async fn l_push(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Trim the list at `key` to its first `len` elements.
    async fn l_trim(&self, key: &str, len: usize) -> Result<(), StoreError>;

    /// Read up to `limit` elements from the head of the list at `key`
    /// (most-recently-pushed first).
    async fn l_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;
}
