use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::AgentId;

/// The type of an event, rendered on the wire as a dotted name such as `agent.created`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventKind {
    // ── Agent lifecycle ────────────────────────────────────────
    AgentRegistered,
    AgentCreated,
    AgentRemoved,
    AgentActivated,
    AgentDeactivated,
    AgentPreloaded,
    AgentError,

    // ── Agent activity ─────────────────────────────────────────
    MessageReceived,
    ActionCompleted,

    // ── System ─────────────────────────────────────────────────
    Heartbeat,
    Shutdown,

    /// Any domain event emitted by agents or extensions.
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AgentRegistered => "agent.registered",
            Self::AgentCreated => "agent.created",
            Self::AgentRemoved => "agent.removed",
            Self::AgentActivated => "agent.activated",
            Self::AgentDeactivated => "agent.deactivated",
            Self::AgentPreloaded => "agent.preloaded",
            Self::AgentError => "agent.error",
            Self::MessageReceived => "message.received",
            Self::ActionCompleted => "action.completed",
            Self::Heartbeat => "system.heartbeat",
            Self::Shutdown => "system.shutdown",
            Self::Custom(name) => name,
        }
    }

    /// Lifecycle events are produced by the runtime itself and never routed back
    /// into an agent's autonomous loop.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AgentRegistered
                | Self::AgentCreated
                | Self::AgentRemoved
                | Self::AgentActivated
                | Self::AgentDeactivated
                | Self::AgentPreloaded
                | Self::AgentError
                | Self::Heartbeat
                | Self::Shutdown
        )
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "agent.registered" => Self::AgentRegistered,
            "agent.created" => Self::AgentCreated,
            "agent.removed" => Self::AgentRemoved,
            "agent.activated" => Self::AgentActivated,
            "agent.deactivated" => Self::AgentDeactivated,
            "agent.preloaded" => Self::AgentPreloaded,
            "agent.error" => Self::AgentError,
            "message.received" => Self::MessageReceived,
            "action.completed" => Self::ActionCompleted,
            "system.heartbeat" => Self::Heartbeat,
            "system.shutdown" => Self::Shutdown,
            _ => Self::Custom(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event flowing through the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            agent_id: None,
            data: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// An event addressed to (or emitted by) one agent.
    pub fn for_agent(kind: EventKind, agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::new(kind)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// A broadcast-based event bus for runtime-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn emit(&self, event: Event) {
        tracing::trace!(event = %event.kind, agent_id = ?event.agent_id, "emitting event");
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
