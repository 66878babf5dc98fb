use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::character::AgentConfig;
use crate::event::Event;
use crate::types::{AgentId, AgentStatus};
use crate::Result;

/// A memory entry surfaced by an agent's memory module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    /// Importance in 0.0 - 1.0.
    #[serde(default)]
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

/// Current emotional state reported by an agent's emotion module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub current: String,
    /// Intensity in 0.0 - 1.0.
    pub intensity: f32,
}

/// An extension loaded into an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Names of the actions this extension exposes.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Something an agent could do on its own initiative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub action: String,
    /// Relative importance, typically 0.0 - 1.0.
    pub priority: f64,
    /// How time-sensitive the action is, typically 0.0 - 1.0.
    pub urgency: f64,
    #[serde(default)]
    pub params: Value,
}

impl ActionCandidate {
    pub fn new(action: impl Into<String>, priority: f64, urgency: f64) -> Self {
        Self {
            action: action.into(),
            priority,
            urgency,
            params: Value::Null,
        }
    }

    pub fn score(&self) -> f64 {
        self.priority * self.urgency
    }
}

/// The action a decision engine selected for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub agent_id: AgentId,
    pub action: String,
    pub score: f64,
    #[serde(default)]
    pub params: Value,
    pub decided_at: DateTime<Utc>,
}

/// Counters an agent's own modules feed: memory writes, emotion shifts,
/// plan steps, handled messages.
pub trait MetricsSink: Send + Sync {
    fn record_message_processed(&self, response_time_ms: Option<f64>);

    fn record_memory_stored(&self);

    fn record_emotion_change(&self);

    fn record_plan_step_executed(&self);
}

/// A materialized runtime agent.
///
/// Implementations use interior mutability: the runtime holds agents as
/// `Arc<dyn Agent>` and ticks them concurrently.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn status(&self) -> AgentStatus;

    /// Last time the agent did anything observable. Drives idle unloading.
    fn last_activity(&self) -> DateTime<Utc>;

    /// Wire up modules, extensions and portal for the given config.
    async fn initialize(&self, config: &AgentConfig) -> Result<()>;

    /// Handed the runtime's metrics sink before `initialize`.
    fn attach_metrics(&self, _sink: Arc<dyn MetricsSink>) {}

    /// Release everything `initialize` acquired.
    async fn cleanup(&self) -> Result<()>;

    /// One scheduling cycle: the agent's opportunity to think and act.
    async fn tick(&self) -> Result<()>;

    fn extensions(&self) -> Vec<ExtensionInfo> {
        Vec::new()
    }

    /// Name of the model provider this agent talks to, if any.
    fn portal(&self) -> Option<String> {
        None
    }

    fn emotion(&self) -> Option<EmotionSnapshot> {
        None
    }

    /// Events the agent has received but not yet processed.
    fn pending_events(&self) -> Vec<Event> {
        Vec::new()
    }

    async fn recent_memories(&self, _limit: usize) -> Vec<MemoryRecord> {
        Vec::new()
    }

    /// Actions the agent would consider during an autonomous cycle.
    async fn autonomous_candidates(&self) -> Vec<ActionCandidate> {
        Vec::new()
    }

    async fn execute_decision(&self, _decision: &Decision) -> Result<()> {
        Ok(())
    }

    /// An external event delivered while the agent runs autonomously.
    async fn on_event(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Builds agents from configs. Injected into the agent manager.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, config: &AgentConfig) -> Result<Arc<dyn Agent>>;

    /// Warm up whatever `create` will need (module resolution, portal handshakes)
    /// without materializing the agent.
    async fn preload(&self, _config: &AgentConfig) -> Result<()> {
        Ok(())
    }
}
