//! State-change event publication.
//!
//! Connector lifecycle changes and reconciler findings are published on a
//! broadcast bus. External transports (WebSocket fan-out, webhooks) are
//! collaborators that subscribe here; this crate only provides
//! publish/subscribe.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::registry::ConnectorStatus;

/// State-change events emitted by the registry and reconciler
#[derive(Debug, Clone)]
pub enum Event {
    /// Connector created in the registry and at the gateway
    ConnectorCreated { cid: String },

    /// Connector configuration updated
    ConnectorUpdated { cid: String },

    /// Connector removed
    ConnectorDeleted { cid: String },

    /// Start command accepted by the gateway
    ConnectorStarting { cid: String },

    /// Stop command accepted by the gateway
    ConnectorStopping { cid: String },

    /// Reconciler observed a status change at the gateway
    StatusChanged {
        cid: String,
        previous: ConnectorStatus,
        current: ConnectorStatus,
    },

    /// Local status disagreed with gateway truth and was corrected
    DriftDetected {
        cid: String,
        local: ConnectorStatus,
        gateway: ConnectorStatus,
    },

    /// A reconciliation pass finished
    ReconcilePass {
        connectors: usize,
        drift: usize,
        at: DateTime<Utc>,
    },
}

/// Broadcast event bus.
///
/// Publishing never blocks and never fails; events are dropped when no
/// subscriber is listening or a subscriber lags behind the channel capacity.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        debug!(event = ?event, "publishing event");
        // Ignore send errors (no subscribers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new(16);

        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::ConnectorCreated {
            cid: "conn1".into(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            Event::ConnectorCreated { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            Event::ConnectorCreated { .. }
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(Event::ConnectorDeleted {
            cid: "conn1".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
