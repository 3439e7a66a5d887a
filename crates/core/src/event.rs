//! Domain event system — decoupled communication between bounded contexts.
//!
//! Raised when runner liveness or pairing state changes so that interested
//! parts of the gateway (and, in future, metrics/observability sinks) can
//! react without tight coupling to the component that caused the change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events raised by the pairing and session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A runner registered or re-registered and is now reachable.
    RunnerOnline {
        runner_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A runner's socket dropped, or its heartbeat lapsed.
    RunnerOffline {
        runner_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An app successfully paired with a runner.
    Paired {
        runner_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An app explicitly unpaired from a runner.
    Unpaired {
        runner_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub — any number of
/// observers (logging sinks, metrics exporters, debug endpoints) can
/// subscribe without the publisher knowing about them.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::RunnerOnline {
            runner_id: "R1".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::RunnerOnline { runner_id, .. } => assert_eq!(runner_id, "R1"),
            _ => panic!("expected RunnerOnline"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::Unpaired {
            runner_id: "R1".into(),
            timestamp: Utc::now(),
        });
    }
}
