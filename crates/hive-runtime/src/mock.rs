//! Mock agents and factory for deterministic testing.
//!
//! Every agent the factory builds is kept so tests can inspect it after the
//! runtime has taken ownership of the `Arc<dyn Agent>`.
//!
//! # Example
//! ```
//! use hive_runtime::mock::MockFactory;
//! let factory = MockFactory::new().failing_tick_for("grumpy");
//! assert_eq!(factory.created(), 0);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use hive_core::{
    ActionCandidate, Agent, AgentConfig, AgentFactory, AgentStatus, Decision, EmotionSnapshot,
    Event, ExtensionInfo, HiveError, MemoryRecord, MetricsSink, Result,
};

/// Behaviour shared by every agent a [`MockFactory`] builds.
#[derive(Clone, Default)]
struct Script {
    fail_init: bool,
    fail_cleanup: bool,
    failing_ticks: HashSet<String>,
    candidates: Vec<ActionCandidate>,
    cycle_delay: Option<Duration>,
    memories: Vec<String>,
    emotion: Option<EmotionSnapshot>,
}

pub struct MockAgent {
    id: String,
    name: String,
    script: Script,
    status: Mutex<AgentStatus>,
    last_activity: Mutex<DateTime<Utc>>,
    extensions: Vec<ExtensionInfo>,
    ticks: AtomicU64,
    cleanups: AtomicU64,
    initialized: AtomicBool,
    metrics: Mutex<Option<Arc<dyn MetricsSink>>>,
    /// Whether a sink was attached by the time `initialize` ran.
    metrics_at_init: AtomicBool,
    decisions: Mutex<Vec<Decision>>,
    events: Mutex<Vec<Event>>,
}

impl MockAgent {
    fn new(config: &AgentConfig, script: Script) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            script,
            status: Mutex::new(AgentStatus::Idle),
            last_activity: Mutex::new(Utc::now()),
            extensions: config
                .extensions
                .iter()
                .map(|ext| ExtensionInfo {
                    id: ext.provider.clone(),
                    name: ext.provider.clone(),
                    enabled: ext.enabled,
                    actions: Vec::new(),
                })
                .collect(),
            ticks: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            metrics: Mutex::new(None),
            metrics_at_init: AtomicBool::new(false),
            decisions: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Pretend the agent was last active at `at`.
    pub fn set_last_activity(&self, at: DateTime<Utc>) {
        *self.last_activity.lock() = at;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn cleanups(&self) -> u64 {
        self.cleanups.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    pub fn metrics_sink(&self) -> Option<Arc<dyn MetricsSink>> {
        self.metrics.lock().clone()
    }

    pub fn had_metrics_at_init(&self) -> bool {
        self.metrics_at_init.load(Ordering::Relaxed)
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().clone()
    }

    pub fn received_events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Agent for MockAgent {
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
        *self.metrics.lock() = Some(sink);
    }

    async fn initialize(&self, _config: &AgentConfig) -> Result<()> {
        self.metrics_at_init
            .store(self.metrics.lock().is_some(), Ordering::Relaxed);
        if self.script.fail_init {
            return Err(HiveError::Agent(format!("{} refused to initialize", self.id)));
        }
        self.initialized.store(true, Ordering::Relaxed);
        *self.status.lock() = AgentStatus::Active;
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        if self.script.fail_cleanup {
            return Err(HiveError::Agent(format!("{} failed to clean up", self.id)));
        }
        *self.status.lock() = AgentStatus::Idle;
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if self.script.failing_ticks.contains(&self.id) {
            *self.status.lock() = AgentStatus::Error;
            return Err(HiveError::Agent(format!("{} tick failed", self.id)));
        }
        Ok(())
    }

    fn extensions(&self) -> Vec<ExtensionInfo> {
        self.extensions.clone()
    }

    fn emotion(&self) -> Option<EmotionSnapshot> {
        self.script.emotion.clone()
    }

    async fn recent_memories(&self, limit: usize) -> Vec<MemoryRecord> {
        self.script
            .memories
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, content)| MemoryRecord {
                id: format!("{}-mem-{i}", self.id),
                content: content.clone(),
                importance: 0.5,
                created_at: Utc::now(),
            })
            .collect()
    }

    async fn autonomous_candidates(&self) -> Vec<ActionCandidate> {
        if let Some(delay) = self.script.cycle_delay {
            tokio::time::sleep(delay).await;
        }
        self.script.candidates.clone()
    }

    async fn execute_decision(&self, decision: &Decision) -> Result<()> {
        self.decisions.lock().push(decision.clone());
        Ok(())
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// A factory whose agents follow a script.
#[derive(Default)]
pub struct MockFactory {
    script: Script,
    fail_create: bool,
    fail_preload: bool,
    create_delay: Option<Duration>,
    created: AtomicUsize,
    preloaded: AtomicUsize,
    agents: Mutex<HashMap<String, Arc<MockAgent>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.script.fail_init = true;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.script.fail_cleanup = true;
        self
    }

    pub fn failing_preload(mut self) -> Self {
        self.fail_preload = true;
        self
    }

    pub fn failing_tick_for(mut self, agent_id: &str) -> Self {
        self.script.failing_ticks.insert(agent_id.to_string());
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<ActionCandidate>) -> Self {
        self.script.candidates = candidates;
        self
    }

    /// Make every autonomous cycle take `delay` before producing candidates.
    pub fn with_cycle_delay(mut self, delay: Duration) -> Self {
        self.script.cycle_delay = Some(delay);
        self
    }

    pub fn with_memories(mut self, memories: &[&str]) -> Self {
        self.script.memories = memories.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_emotion(mut self, current: &str, intensity: f32) -> Self {
        self.script.emotion = Some(EmotionSnapshot {
            current: current.to_string(),
            intensity,
        });
        self
    }

    /// Number of `create` calls that produced an agent.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn preloaded(&self) -> usize {
        self.preloaded.load(Ordering::Relaxed)
    }

    /// The most recent agent built for `agent_id`.
    pub fn agent(&self, agent_id: &str) -> Option<Arc<MockAgent>> {
        self.agents.lock().get(agent_id).cloned()
    }
}

#[async_trait]
impl AgentFactory for MockFactory {
    async fn create(&self, config: &AgentConfig) -> Result<Arc<dyn Agent>> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create {
            return Err(HiveError::Agent(format!("factory cannot build {}", config.id)));
        }
        let agent = Arc::new(MockAgent::new(config, self.script.clone()));
        self.agents
            .lock()
            .insert(config.id.clone(), Arc::clone(&agent));
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(agent)
    }

    async fn preload(&self, config: &AgentConfig) -> Result<()> {
        if self.fail_preload {
            return Err(HiveError::Agent(format!("cannot preload {}", config.id)));
        }
        self.preloaded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
