//! A minimal built-in agent.
//!
//! `HeartbeatAgent` has no modules of its own: it ticks, records activity and,
//! when running autonomously, chooses between reflecting and resting.
//! Reflecting stores a memory and leaves it content; an interrupt makes it
//! alert. It lets the runtime be exercised end to end without external memory,
//! portal or extension providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use hive_core::{
    ActionCandidate, Agent, AgentConfig, AgentFactory, AgentStatus, Decision, EmotionSnapshot,
    Event, ExtensionInfo, MetricsSink, Result,
};

const CALM: &str = "calm";
const CONTENT: &str = "content";
const ALERT: &str = "alert";

pub struct HeartbeatAgent {
    id: String,
    name: String,
    status: Mutex<AgentStatus>,
    last_activity: Mutex<DateTime<Utc>>,
    extensions: RwLock<Vec<ExtensionInfo>>,
    portal: RwLock<Option<String>>,
    metrics: RwLock<Option<Arc<dyn MetricsSink>>>,
    mood: Mutex<&'static str>,
    beats: AtomicU64,
    actions: AtomicU64,
    memories: AtomicU64,
}

impl HeartbeatAgent {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            status: Mutex::new(AgentStatus::Idle),
            last_activity: Mutex::new(Utc::now()),
            extensions: RwLock::new(Vec::new()),
            portal: RwLock::new(None),
            metrics: RwLock::new(None),
            mood: Mutex::new(CALM),
            beats: AtomicU64::new(0),
            actions: AtomicU64::new(0),
            memories: AtomicU64::new(0),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn actions(&self) -> u64 {
        self.actions.load(Ordering::Relaxed)
    }

    pub fn memories(&self) -> u64 {
        self.memories.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    fn with_metrics(&self, record: impl FnOnce(&dyn MetricsSink)) {
        if let Some(sink) = self.metrics.read().as_deref() {
            record(sink);
        }
    }

    fn set_mood(&self, mood: &'static str) {
        let previous = std::mem::replace(&mut *self.mood.lock(), mood);
        if previous != mood {
            debug!(agent_id = %self.id, from = previous, to = mood, "mood changed");
            self.with_metrics(|m| m.record_emotion_change());
        }
    }
}

#[async_trait]
impl Agent for HeartbeatAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    fn attach_metrics(&self, sink: Arc<dyn MetricsSink>) {
        *self.metrics.write() = Some(sink);
    }

    async fn initialize(&self, config: &AgentConfig) -> Result<()> {
        *self.extensions.write() = config
            .extensions
            .iter()
            .map(|ext| ExtensionInfo {
                id: ext.provider.clone(),
                name: ext.provider.clone(),
                enabled: ext.enabled,
                actions: Vec::new(),
            })
            .collect();
        *self.portal.write() = config.portal.as_ref().map(|p| p.provider.clone());
        *self.status.lock() = AgentStatus::Active;
        self.touch();
        info!(agent_id = %self.id, "heartbeat agent initialized");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        *self.status.lock() = AgentStatus::Idle;
        debug!(agent_id = %self.id, beats = self.beats(), "heartbeat agent cleaned up");
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(agent_id = %self.id, beats, "heartbeat");
        Ok(())
    }

    fn extensions(&self) -> Vec<ExtensionInfo> {
        self.extensions.read().clone()
    }

    fn portal(&self) -> Option<String> {
        self.portal.read().clone()
    }

    fn emotion(&self) -> Option<EmotionSnapshot> {
        let current = *self.mood.lock();
        Some(EmotionSnapshot {
            current: current.to_string(),
            intensity: if current == ALERT { 0.8 } else { 0.3 },
        })
    }

    async fn autonomous_candidates(&self) -> Vec<ActionCandidate> {
        vec![
            ActionCandidate::new("reflect", 0.6, 0.5),
            ActionCandidate::new("rest", 0.4, 0.5),
        ]
    }

    async fn execute_decision(&self, decision: &Decision) -> Result<()> {
        *self.status.lock() = AgentStatus::Thinking;
        self.actions.fetch_add(1, Ordering::Relaxed);
        debug!(agent_id = %self.id, action = %decision.action, "heartbeat agent acting");
        self.with_metrics(|m| m.record_plan_step_executed());
        if decision.action == "reflect" {
            self.memories.fetch_add(1, Ordering::Relaxed);
            self.with_metrics(|m| m.record_memory_stored());
            self.set_mood(CONTENT);
        } else {
            self.set_mood(CALM);
        }
        self.touch();
        *self.status.lock() = AgentStatus::Active;
        Ok(())
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        debug!(agent_id = %self.id, event = %event.kind, "heartbeat agent interrupted");
        self.set_mood(ALERT);
        self.touch();
        Ok(())
    }
}

/// Builds [`HeartbeatAgent`]s for any character.
#[derive(Debug, Default)]
pub struct HeartbeatFactory;

#[async_trait]
impl AgentFactory for HeartbeatFactory {
    async fn create(&self, config: &AgentConfig) -> Result<Arc<dyn Agent>> {
        Ok(Arc::new(HeartbeatAgent::new(config)))
    }
}
