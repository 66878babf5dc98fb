//! # Context System
//!
//! Per-tick reasoning snapshots ([`ThoughtContext`]) and the optional enrichment
//! layer that decorates them with memory, emotional, temporal and environment
//! signals. The layer is a collaborator: the runtime only sees the traits below
//! and degrades to the unenriched base context whenever it is absent or failing.

pub mod tiered;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use hive_core::{AgentId, AgentStatus, EmotionSnapshot, Event, MemoryRecord, Result};

pub use tiered::{InMemoryContextBootstrapper, TieredContextManager};

/// The agent half of a thought context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub name: String,
    pub status: AgentStatus,
    pub last_activity: DateTime<Utc>,
    pub emotion: Option<EmotionSnapshot>,
    pub extensions: Vec<String>,
    pub portal: Option<String>,
}

/// The world half of a thought context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub active_agents: usize,
    pub autonomous_agents: usize,
    pub timestamp: DateTime<Utc>,
}

/// Everything an agent reasons over during one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtContext {
    pub agent_id: AgentId,
    pub state: AgentStateSnapshot,
    pub environment: EnvironmentSnapshot,
    /// Events received but not yet processed.
    pub events: Vec<Event>,
    pub memories: Vec<MemoryRecord>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<ContextEnrichment>,
}

impl ThoughtContext {
    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_some()
    }
}

/// Which signals to add, and how deep to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub include_memory: bool,
    pub include_emotional: bool,
    pub include_temporal: bool,
    pub include_environment: bool,
    pub max_depth: u8,
}

impl EnrichmentRequest {
    /// Every signal, up to `max_depth`.
    pub fn full(max_depth: u8) -> Self {
        Self {
            include_memory: true,
            include_emotional: true,
            include_temporal: true,
            include_environment: true,
            max_depth,
        }
    }
}

impl Default for EnrichmentRequest {
    fn default() -> Self {
        Self::full(3)
    }
}

/// Where an enrichment was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Per-agent hot cache.
    L1,
    /// Shared warm cache.
    L2,
    /// Freshly computed.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    /// "morning", "afternoon", "evening" or "night" (UTC).
    pub time_of_day: String,
    pub seconds_since_activity: i64,
}

/// Signals added on top of a base context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEnrichment {
    pub memory_summary: Option<String>,
    pub emotional_tone: Option<String>,
    pub temporal: Option<TemporalContext>,
    pub environment: Option<serde_json::Value>,
    /// Number of enrichment levels actually computed.
    pub depth: u8,
    pub tier: CacheTier,
}

/// What the context manager knows about a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub traits: Vec<String>,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub registered_agents: usize,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub l2_entries: usize,
}

/// Enriches thought contexts.
#[async_trait]
pub trait ContextManager: Send + Sync {
    async fn enrich(&self, base: &ThoughtContext, request: &EnrichmentRequest)
    -> Result<ThoughtContext>;

    async fn register_agent(&self, profile: AgentProfile) -> Result<()>;

    async fn unregister_agent(&self, agent_id: &str) -> Result<()>;

    fn stats(&self) -> ContextStats;
}

/// The long-running side of a context system, shut down with the runtime.
#[async_trait]
pub trait ContextService: Send + Sync {
    async fn shutdown(&self) -> Result<()>;
}

/// Result of bootstrapping a context system.
#[derive(Clone, Default)]
pub struct BootstrapOutcome {
    pub success: bool,
    pub context_manager: Option<Arc<dyn ContextManager>>,
    pub runtime_adapter: Option<Arc<dyn ContextService>>,
    pub error: Option<String>,
}

impl BootstrapOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Brings a context system up and down.
#[async_trait]
pub trait ContextBootstrapper: Send + Sync {
    async fn bootstrap(&self) -> Result<BootstrapOutcome>;

    async fn shutdown(&self) -> Result<()>;
}
