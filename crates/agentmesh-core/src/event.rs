use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{CollabPattern, SessionStatus};

/// A lifecycle event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// An agent joined the registry.
    AgentRegistered {
        /// The new agent.
        agent_id: Uuid,
        /// Its name.
        name: String,
    },
    /// An agent left the registry.
    AgentUnregistered {
        /// The removed agent.
        agent_id: Uuid,
    },
    /// An agent was explicitly recovered from the error state.
    AgentRecovered {
        /// The recovered agent.
        agent_id: Uuid,
    },
    /// A task entered the store.
    TaskSubmitted {
        /// The new task.
        task_id: Uuid,
    },
    /// A task was committed to one or more agents.
    TaskScheduled {
        /// The dispatched task.
        task_id: Uuid,
        /// The agents it was committed to.
        agent_ids: Vec<Uuid>,
    },
    /// No suitable agent was available; the task stays queued.
    TaskQueued {
        /// The waiting task.
        task_id: Uuid,
    },
    /// A task finished successfully.
    TaskCompleted {
        /// The finished task.
        task_id: Uuid,
    },
    /// A task finished unsuccessfully.
    TaskFailed {
        /// The failed task.
        task_id: Uuid,
        /// Why it failed.
        reason: String,
    },
    /// A task was withdrawn.
    TaskCancelled {
        /// The withdrawn task.
        task_id: Uuid,
    },
    /// A collaboration session was created.
    SessionCreated {
        /// The new session.
        session_id: Uuid,
        /// The task it executes.
        task_id: Uuid,
        /// Its topology.
        pattern: CollabPattern,
    },
    /// A collaboration session ended and was archived.
    SessionEnded {
        /// The archived session.
        session_id: Uuid,
        /// Its terminal status.
        status: SessionStatus,
    },
}

/// Optional lifecycle telemetry hook.
///
/// Implementations must be cheap and non-blocking; the engine emits from hot
/// paths while holding no locks.
pub trait EventSink: Send + Sync {
    /// Observe one event.
    fn emit(&self, event: &Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Buffers events in memory. For tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of events emitted so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(target: "agentmesh::events", event = %payload);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        sink.emit(&Event::TaskSubmitted { task_id: a });
        sink.emit(&Event::TaskCompleted { task_id: b });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::TaskSubmitted { task_id: a });
        assert_eq!(events[1], Event::TaskCompleted { task_id: b });
    }

    #[test]
    fn test_event_serialization_tags_variant() {
        let event = Event::TaskFailed {
            task_id: Uuid::new_v4(),
            reason: "executor crashed".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"task_failed\""));
        assert!(json.contains("executor crashed"));
    }

    #[test]
    fn test_null_sink_is_silent() {
        let sink = NullSink;
        sink.emit(&Event::TaskQueued {
            task_id: Uuid::new_v4(),
        });
    }
}
