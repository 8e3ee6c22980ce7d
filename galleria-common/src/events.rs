//! Event types for the galleria event system
//!
//! Collection runs broadcast progress over an EventBus backed by a tokio
//! broadcast channel; the SSE endpoint forwards events to connected clients.
//! Delivery is best-effort: a bus with no subscribers drops events silently.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Galleria event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CollectEvent {
    /// A collection task left the queue and began executing
    TaskStarted {
        task_id: Uuid,
        log_type: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A page of upstream results was fetched within a run
    PageFetched {
        log_id: Uuid,
        offset: u32,
        items: usize,
    },

    /// Incremental progress within a run (persisted artwork count so far)
    ProgressUpdated {
        log_id: Uuid,
        artworks_count: u32,
        operation: String,
    },

    /// A collection task reached a terminal state
    TaskFinished {
        task_id: Uuid,
        log_id: Uuid,
        status: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CollectEvent {
    /// Event type name for SSE `event:` framing
    pub fn event_type(&self) -> &str {
        match self {
            CollectEvent::TaskStarted { .. } => "TaskStarted",
            CollectEvent::PageFetched { .. } => "PageFetched",
            CollectEvent::ProgressUpdated { .. } => "ProgressUpdated",
            CollectEvent::TaskFinished { .. } => "TaskFinished",
        }
    }
}

/// Broadcast bus for collect events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CollectEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CollectEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error only means no subscriber is currently listening; emitters
    /// ignore it.
    pub fn emit(&self, event: CollectEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let log_id = Uuid::new_v4();
        bus.emit(CollectEvent::PageFetched {
            log_id,
            offset: 30,
            items: 30,
        });

        match rx.recv().await.unwrap() {
            CollectEvent::PageFetched { log_id: id, offset, items } => {
                assert_eq!(id, log_id);
                assert_eq!(offset, 30);
                assert_eq!(items, 30);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit(CollectEvent::ProgressUpdated {
            log_id: Uuid::new_v4(),
            artworks_count: 1,
            operation: "test".to_string(),
        });
    }

    #[test]
    fn event_type_names_match_variants() {
        let event = CollectEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            log_type: "ranking_works".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "TaskStarted");
    }
}
