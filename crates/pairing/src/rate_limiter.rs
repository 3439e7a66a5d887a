//! Rate limiter (component F).
//!
//! Per-`clientToken` sliding-window limit on failed `app:pair` attempts,
//! with a temporary ban once the window fills. A failed attempt under
//! concurrent load may push the limiter one attempt past the threshold
//! before the ban lands — acceptable, since it only trips the ban earlier,
//! never later.

use pairwire_core::{ClientToken, PairingError, Store};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Defaults matching spec: a 60s sliding window, 5 failures before a ban,
/// and a 300s ban duration. [`RateLimiter::new`] takes these as parameters
/// so a deployer can retune them via configuration.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_FAILURES: u64 = 5;
pub const DEFAULT_BAN_DURATION: Duration = Duration::from_secs(300);

pub struct RateLimiter {
    store: Arc<dyn Store>,
    window: Duration,
    max_failures: u64,
    ban_duration: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, window: Duration, max_failures: u64, ban_duration: Duration) -> Self {
        Self {
            store,
            window,
            max_failures,
            ban_duration,
        }
    }

    pub async fn is_banned(&self, token: &ClientToken) -> Result<bool, PairingError> {
        let raw = self
            .store
            .get(&ban_key(token))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let banned_until: i64 = raw.parse().map_err(|_| PairingError::Internal)?;
        Ok(banned_until > now_millis())
    }

    pub async fn record_failed_attempt(&self, token: &ClientToken) -> Result<(), PairingError> {
        let key = attempts_key(token);
        let now = now_millis();
        let window_start = now - self.window.as_millis() as i64;

        self.store
            .z_rem_by_score(&key, f64::MIN, window_start as f64)
            .await
            .map_err(|_| PairingError::Internal)?;
        self.store
            .z_add(&key, &now.to_string(), now as f64)
            .await
            .map_err(|_| PairingError::Internal)?;
        self.store
            .expire(&key, self.window)
            .await
            .map_err(|_| PairingError::Internal)?;

        let count = self
            .store
            .z_count(&key, window_start as f64, now as f64)
            .await
            .map_err(|_| PairingError::Internal)?;

        if count >= self.max_failures {
            let banned_until = now + self.ban_duration.as_millis() as i64;
            self.store
                .set_with_ttl(&ban_key(token), &banned_until.to_string(), self.ban_duration)
                .await
                .map_err(|_| PairingError::Internal)?;
        }
        Ok(())
    }

    pub async fn get_remaining_ban_time(&self, token: &ClientToken) -> Result<u64, PairingError> {
        let raw = self
            .store
            .get(&ban_key(token))
            .await
            .map_err(|_| PairingError::Internal)?;
        let Some(raw) = raw else {
            return Ok(0);
        };
        let banned_until: i64 = raw.parse().map_err(|_| PairingError::Internal)?;
        Ok(((banned_until - now_millis()).max(0) / 1000) as u64)
    }

    pub async fn reset(&self, token: &ClientToken) -> Result<(), PairingError> {
        self.store
            .del(&[&attempts_key(token), &ban_key(token)])
            .await
            .map_err(|_| PairingError::Internal)
    }
}

fn attempts_key(token: &ClientToken) -> String {
    format!("ratelimit:attempts:{token}")
}

fn ban_key(token: &ClientToken) -> String {
    format!("ratelimit:ban:{token}")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}
