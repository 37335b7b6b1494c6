//! Engine event system — decoupled observation of a running Structure.
//!
//! Events are published when something interesting happens during a run.
//! Callers can subscribe to react without tight coupling; there is no
//! process-wide singleton, the bus is injected at construction time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All engine events published during Structure execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A step transitioned to Executing
    StepStarted {
        step_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// A step transitioned to Finished
    StepFinished {
        step_id: String,
        is_error: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked inside an action loop
    ToolInvoked {
        step_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An exchange was recorded into Memory
    MemoryRecorded {
        entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// A Structure run ended
    StructureCompleted {
        kind: String,
        steps_run: usize,
        failed: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for engine events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what
/// they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: EngineEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
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

        bus.publish(EngineEvent::ToolInvoked {
            step_id: "s1".into(),
            tool_name: "calculator".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            EngineEvent::ToolInvoked {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "calculator");
                assert!(success);
            }
            _ => panic!("Expected ToolInvoked event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        // Publishing with no subscribers should not panic
        bus.publish(EngineEvent::StructureCompleted {
            kind: "pipeline".into(),
            steps_run: 0,
            failed: true,
            timestamp: Utc::now(),
        });
    }
}
