//! Outbound notifications emitted after an order is committed.
//!
//! Publishing is fire-and-forget: a delivery failure is logged and counted but
//! never affects the order it describes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::snapshot::OrderSnapshot;

/// Event type published once per committed order.
pub const ORDER_CREATED: &str = "order.created";

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outbound event with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// The type of the event (e.g. "order.created").
    pub event_type: String,

    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Routing metadata such as the owning user.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Builds the `order.created` event for a committed order.
    pub fn order_created(order: &OrderSnapshot) -> Result<Self, serde_json::Error> {
        let metadata = HashMap::from([
            ("order_id".to_string(), serde_json::to_value(order.id)?),
            ("user_id".to_string(), serde_json::to_value(order.user_id)?),
        ]);
        Ok(Self {
            event_id: EventId::new(),
            event_type: ORDER_CREATED.to_string(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(order)?,
            metadata,
        })
    }
}

/// Errors that can occur while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport rejected or lost the event.
    #[error("Delivery of {event_type} failed: {reason}")]
    Delivery { event_type: String, reason: String },
}

/// Sink for outbound events.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    /// Publishes a single event.
    async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError>;
}

/// Publisher that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            payload = %event.payload,
            "event published"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    events: Mutex<Vec<EventEnvelope>>,
    fail: AtomicBool,
    published: Notify,
}

/// In-memory publisher that records events, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    inner: Arc<Recorded>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject every following event.
    pub fn set_fail(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the events delivered so far.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of events delivered so far.
    pub fn event_count(&self) -> usize {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Waits until at least `count` events have been delivered.
    ///
    /// Returns false if the timeout elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.published.notified();
            if self.event_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.event_count() >= count;
            }
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError> {
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Delivery {
                event_type: event.event_type,
                reason: "publisher configured to fail".to_string(),
            });
        }
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        self.inner.published.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId, UserId};
    use store::OrderStatus;

    fn snapshot() -> OrderSnapshot {
        OrderSnapshot {
            id: OrderId::new(12),
            user_id: UserId::new(3),
            status: OrderStatus::Pending,
            total_amount: Money::from_cents(500),
            items: vec![],
            created_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn order_created_envelope() {
        let event = EventEnvelope::order_created(&snapshot()).unwrap();

        assert_eq!(event.event_type, ORDER_CREATED);
        assert_eq!(event.payload["id"], 12);
        assert_eq!(event.payload["total_amount"], "5.00");
        assert_eq!(event.metadata["user_id"], 3);
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[tokio::test]
    async fn recorder_wakes_waiters() {
        let publisher = InMemoryPublisher::new();
        let background = publisher.clone();
        tokio::spawn(async move {
            let event = EventEnvelope::order_created(&snapshot()).unwrap();
            background.publish(event).await.unwrap();
        });

        assert!(publisher.wait_for(1, Duration::from_secs(1)).await);
        assert_eq!(publisher.events()[0].event_type, ORDER_CREATED);
    }

    #[tokio::test]
    async fn failing_recorder_drops_events() {
        let publisher = InMemoryPublisher::new();
        publisher.set_fail(true);

        let event = EventEnvelope::order_created(&snapshot()).unwrap();
        let result = publisher.publish(event).await;

        assert!(matches!(result, Err(PublishError::Delivery { .. })));
        assert!(!publisher.wait_for(1, Duration::from_millis(20)).await);
    }
}
