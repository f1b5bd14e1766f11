//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] replaces ambient "something changed" signals with an
//! explicit hub: publishers name a topic, subscribers filter on it.
//! Share it via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use audiogen_core::types::JobId;

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// A topic-tagged event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Dot-separated topic name, e.g. `"history.updated"`.
    pub topic: String,

    /// Job the event concerns, when there is one.
    pub job_id: Option<JobId>,

    /// Topic-specific JSON payload.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ClientEvent {
    /// Create an event with an empty object payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            job_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is(&self, topic: &str) -> bool {
        self.topic == topic
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 64;

/// In-process fan-out event bus.
///
/// ```rust
/// use audiogen_events::bus::{ClientEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ClientEvent::new("history.updated"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers that fall more than `capacity` events behind
    /// observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published with no subscribers are dropped.
    pub fn publish(&self, event: ClientEvent) {
        tracing::debug!(topic = %event.topic, job_id = ?event.job_id, "Publishing client event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
