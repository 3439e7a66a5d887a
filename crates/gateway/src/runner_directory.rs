//! Runner directory (component J).
//!
//! In-process map of currently-connected runner sockets. Backed by a single
//! `RwLock` around a `HashMap`; critical sections are short (lookup, insert,
//! remove — never held across a socket write or store call).

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use pairwire_core::RunnerId;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// A connected runner's outbound channel: frames pushed here are forwarded
/// to its socket by that connection's send loop.
#[derive(Clone)]
pub struct RunnerHandle {
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RunnerDirectory {
    runners: RwLock<HashMap<RunnerId, RunnerHandle>>,
}

impl RunnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runner_id`'s socket, returning the previous entry (if any)
    /// so the caller can close it — a later registration for the same
    /// `runnerId` replaces the earlier one.
    pub async fn register(&self, runner_id: RunnerId, handle: RunnerHandle) -> Option<RunnerHandle> {
        self.runners.write().await.insert(runner_id, handle)
    }

    pub async fn unregister(&self, runner_id: &RunnerId) {
        self.runners.write().await.remove(runner_id);
    }

    pub async fn get(&self, runner_id: &RunnerId) -> Option<RunnerHandle> {
        self.runners.read().await.get(runner_id).cloned()
    }

    pub async fn online_ids(&self) -> Vec<RunnerId> {
        self.runners.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> RunnerHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        RunnerHandle {
            sender: tx,
            connected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_and_get_round_trips() {
        let dir = RunnerDirectory::new();
        let runner_id = RunnerId::from("R1");
        dir.register(runner_id.clone(), handle()).await;
        assert!(dir.get(&runner_id).await.is_some());
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier_one() {
        let dir = RunnerDirectory::new();
        let runner_id = RunnerId::from("R1");
        let previous = dir.register(runner_id.clone(), handle()).await;
        assert!(previous.is_none());

        let replaced = dir.register(runner_id.clone(), handle()).await;
        assert!(replaced.is_some());
    }

    #[tokio::test]
    async fn unregister_removes_entry() {
        let dir = RunnerDirectory::new();
        let runner_id = RunnerId::from("R1");
        dir.register(runner_id.clone(), handle()).await;
        dir.unregister(&runner_id).await;
        assert!(dir.get(&runner_id).await.is_none());
    }

    #[tokio::test]
    async fn online_ids_lists_all_registered_runners() {
        let dir = RunnerDirectory::new();
        dir.register(RunnerId::from("R1"), handle()).await;
        dir.register(RunnerId::from("R2"), handle()).await;
        let mut ids = dir.online_ids().await;
        ids.sort();
        assert_eq!(ids, vec![RunnerId::from("R1"), RunnerId::from("R2")]);
    }
}
