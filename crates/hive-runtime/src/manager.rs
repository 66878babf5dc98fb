//! # Agent Manager
//!
//! Exclusive owner of agent existence and lifecycle. Holds two registries:
//!
//! - **active** — materialized agents, ticked by the scheduler.
//! - **lazy** — dormant descriptors that can be preloaded, activated, and
//!   deactivated again when idle.
//!
//! An agent that is active without a lazy descriptor is permanently active and
//! can only be removed, never deactivated.
//!
//! Transitions for one agent id are serialized by a per-id async lock, so two
//! concurrent `activate_agent` calls materialize the agent exactly once.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use hive_core::{
    Agent, AgentConfig, AgentFactory, AgentId, CharacterConfig, Event, EventBus, EventKind,
    HiveError, LazyAgent, LazyAgentStatus, MetricsSink, Result,
};

/// Priority weight of a character flagged as default.
pub const PRIORITY_DEFAULT: u32 = 100;
/// Priority weight of a character with at least one extension.
pub const PRIORITY_EXTENSIONS: u32 = 50;
/// Priority weight of a character with autonomous behaviour enabled.
pub const PRIORITY_AUTONOMOUS: u32 = 25;
/// Priority weight of a character with a memory provider.
pub const PRIORITY_MEMORY: u32 = 10;

/// Registry counts for status output and monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentManagerSummary {
    pub active: usize,
    pub lazy_total: usize,
    /// Lazy descriptors per `LazyAgentStatus`.
    pub lazy_by_status: BTreeMap<String, usize>,
    /// Materialized agents per `AgentStatus`.
    pub active_by_status: BTreeMap<String, usize>,
}

/// Holds one id's lifecycle lock. Dropping it releases the lock and forgets
/// the map entry when nobody else is waiting on it.
struct LifecycleGuard<'a> {
    locks: &'a DashMap<AgentId, Arc<TokioMutex<()>>>,
    agent_id: AgentId,
    lock: Arc<TokioMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LifecycleGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Two owners left means the map and us: no other task holds or awaits it.
        self.locks.remove_if(&self.agent_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

pub struct AgentManager {
    agents: DashMap<AgentId, Arc<dyn Agent>>,
    lazy_agents: DashMap<AgentId, LazyAgent>,
    lifecycle_locks: DashMap<AgentId, Arc<TokioMutex<()>>>,
    factory: RwLock<Option<Arc<dyn AgentFactory>>>,
    metrics: RwLock<Option<Arc<dyn MetricsSink>>>,
    event_bus: EventBus,
}

impl AgentManager {
    /// Create a manager without a factory. Lifecycle calls fail with
    /// [`HiveError::FactoryNotConfigured`] until [`set_agent_factory`](Self::set_agent_factory).
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            agents: DashMap::new(),
            lazy_agents: DashMap::new(),
            lifecycle_locks: DashMap::new(),
            factory: RwLock::new(None),
            metrics: RwLock::new(None),
            event_bus,
        }
    }

    pub fn with_factory(event_bus: EventBus, factory: Arc<dyn AgentFactory>) -> Self {
        let manager = Self::new(event_bus);
        manager.set_agent_factory(factory);
        manager
    }

    pub fn set_agent_factory(&self, factory: Arc<dyn AgentFactory>) {
        *self.factory.write() = Some(factory);
    }

    /// Sink handed to every agent materialized from now on.
    pub fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        *self.metrics.write() = Some(sink);
    }

    pub fn has_factory(&self) -> bool {
        self.factory.read().is_some()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn factory(&self) -> Result<Arc<dyn AgentFactory>> {
        self.factory
            .read()
            .clone()
            .ok_or(HiveError::FactoryNotConfigured)
    }

    /// Take the lifecycle lock for an agent id. Hold the guard for the whole transition.
    async fn lock_lifecycle(&self, agent_id: &str) -> LifecycleGuard<'_> {
        let lock = Arc::clone(
            self.lifecycle_locks
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .value(),
        );
        let guard = Arc::clone(&lock).lock_owned().await;
        LifecycleGuard {
            locks: &self.lifecycle_locks,
            agent_id: agent_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    fn emit(&self, kind: EventKind, agent_id: &str, data: serde_json::Value) {
        self.event_bus
            .emit(Event::for_agent(kind, agent_id).with_data(data));
    }

    /// Factory + initialize. The agent is not registered anywhere yet.
    async fn materialize(
        &self,
        factory: &Arc<dyn AgentFactory>,
        config: &AgentConfig,
    ) -> Result<Arc<dyn Agent>> {
        let agent = factory.create(config).await?;
        let sink = self.metrics.read().clone();
        if let Some(sink) = sink {
            agent.attach_metrics(sink);
        }
        if let Err(e) = agent.initialize(config).await {
            // Best effort: release whatever the half-initialized agent holds.
            if let Err(cleanup_err) = agent.cleanup().await {
                debug!(agent_id = %config.id, error = %cleanup_err, "cleanup after failed init also failed");
            }
            return Err(HiveError::AgentInitialization {
                agent: config.id.clone(),
                reason: e.to_string(),
            });
        }
        Ok(agent)
    }

    /// Run `cleanup` and log instead of failing.
    async fn cleanup_quietly(agent: &Arc<dyn Agent>) {
        if let Err(e) = agent.cleanup().await {
            warn!(agent_id = %agent.id(), error = %e, "agent cleanup failed");
        }
    }

    // ── Permanent agents ───────────────────────────────────────

    /// Create, initialize and register an agent.
    pub async fn create_agent(&self, config: AgentConfig) -> Result<Arc<dyn Agent>> {
        let factory = self.factory()?;
        let _guard = self.lock_lifecycle(&config.id).await;

        let agent = self.materialize(&factory, &config).await.inspect_err(|e| {
            error!(agent_id = %config.id, error = %e, "failed to create agent");
        })?;

        if let Some(previous) = self.agents.insert(config.id.clone(), Arc::clone(&agent)) {
            warn!(agent_id = %config.id, "agent id already active, replacing existing instance");
            Self::cleanup_quietly(&previous).await;
        }

        info!(agent_id = %config.id, name = %config.name, "agent created");
        self.emit(
            EventKind::AgentCreated,
            &config.id,
            serde_json::json!({ "name": config.name }),
        );
        Ok(agent)
    }

    /// Remove an agent from both registries. Returns `false` if it is not active.
    pub async fn remove_agent(&self, agent_id: &str) -> bool {
        let _guard = self.lock_lifecycle(agent_id).await;

        let Some((_, agent)) = self.agents.remove(agent_id) else {
            debug!(agent_id, "remove requested for unknown agent");
            return false;
        };

        Self::cleanup_quietly(&agent).await;
        self.lazy_agents.remove(agent_id);

        info!(agent_id, "agent removed");
        self.emit(EventKind::AgentRemoved, agent_id, serde_json::Value::Null);
        true
    }

    // ── Lazy agents ────────────────────────────────────────────

    /// Register a dormant agent. Re-registering refreshes character and priority
    /// but keeps the lifecycle status and activation history.
    pub fn register_lazy_agent(&self, character: CharacterConfig) -> u32 {
        let priority = Self::calculate_agent_priority(&character);
        let id = character.id.clone();
        match self.lazy_agents.get_mut(&id) {
            Some(mut existing) => {
                debug!(agent_id = %id, status = %existing.status, "refreshing lazy agent descriptor");
                existing.character = character;
                existing.priority = priority;
            }
            None => {
                self.lazy_agents
                    .insert(id.clone(), LazyAgent::new(character, priority));
            }
        }

        debug!(agent_id = %id, priority, "lazy agent registered");
        self.emit(
            EventKind::AgentRegistered,
            &id,
            serde_json::json!({ "priority": priority }),
        );
        priority
    }

    /// Materialize a lazy agent. Idempotent for agents that are already active.
    pub async fn activate_agent(&self, agent_id: &str) -> Result<Arc<dyn Agent>> {
        let _guard = self.lock_lifecycle(agent_id).await;

        let status = self
            .lazy_agents
            .get(agent_id)
            .map(|lazy| lazy.status)
            .ok_or_else(|| HiveError::LazyAgentNotFound(agent_id.to_string()))?;

        if status == LazyAgentStatus::Error {
            return Err(HiveError::Activation {
                agent: agent_id.to_string(),
                reason: "agent is in error state".into(),
            });
        }
        // Active means present in the registry, whatever the descriptor says.
        if let Some(agent) = self.get_agent(agent_id) {
            if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
                if lazy.status != LazyAgentStatus::Active {
                    debug!(agent_id, status = %lazy.status, "adopting already-active agent");
                    lazy.status = LazyAgentStatus::Active;
                }
            }
            debug!(agent_id, "agent already active");
            return Ok(agent);
        }

        let factory = self.factory()?;
        let character = {
            let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) else {
                return Err(HiveError::LazyAgentNotFound(agent_id.to_string()));
            };
            lazy.status = LazyAgentStatus::Activating;
            lazy.character.clone()
        };

        info!(agent_id, "activating lazy agent");
        let config = AgentConfig::from_character(&character);

        match self.materialize(&factory, &config).await {
            Ok(agent) => {
                self.agents
                    .insert(agent_id.to_string(), Arc::clone(&agent));
                let activation_count = match self.lazy_agents.get_mut(agent_id) {
                    Some(mut lazy) => {
                        lazy.status = LazyAgentStatus::Active;
                        lazy.activation_count += 1;
                        lazy.last_activated = Some(Utc::now());
                        lazy.activation_count
                    }
                    None => 0,
                };
                info!(agent_id, activation_count, "lazy agent activated");
                self.emit(
                    EventKind::AgentActivated,
                    agent_id,
                    serde_json::json!({ "activation_count": activation_count }),
                );
                Ok(agent)
            }
            Err(e) => {
                if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
                    lazy.status = LazyAgentStatus::Error;
                }
                error!(agent_id, error = %e, "lazy agent activation failed");
                self.emit(
                    EventKind::AgentError,
                    agent_id,
                    serde_json::json!({ "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Deactivate a lazy-managed active agent. Returns whether anything happened.
    pub async fn deactivate_agent(&self, agent_id: &str) -> bool {
        let _guard = self.lock_lifecycle(agent_id).await;

        if !self.lazy_agents.contains_key(agent_id) {
            warn!(agent_id, "cannot deactivate agent that is not lazy-managed");
            return false;
        }
        let Some((_, agent)) = self.agents.remove(agent_id) else {
            warn!(agent_id, "cannot deactivate agent that is not active");
            return false;
        };

        Self::cleanup_quietly(&agent).await;
        if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
            lazy.status = LazyAgentStatus::Inactive;
        }

        info!(agent_id, "lazy agent deactivated");
        self.emit(EventKind::AgentDeactivated, agent_id, serde_json::Value::Null);
        true
    }

    /// Warm up a lazy agent without materializing it. Returns `true` if the agent
    /// reached `Preloaded` during this call.
    pub async fn preload_agent(&self, agent_id: &str) -> Result<bool> {
        let _guard = self.lock_lifecycle(agent_id).await;

        let character = {
            let Some(lazy) = self.lazy_agents.get(agent_id) else {
                return Err(HiveError::LazyAgentNotFound(agent_id.to_string()));
            };
            if lazy.status != LazyAgentStatus::Inactive {
                debug!(agent_id, status = %lazy.status, "preload skipped");
                return Ok(false);
            }
            lazy.character.clone()
        };

        let factory = self.factory()?;
        if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
            lazy.status = LazyAgentStatus::Preloading;
        }

        let config = AgentConfig::from_character(&character);
        match factory.preload(&config).await {
            Ok(()) => {
                if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
                    lazy.status = LazyAgentStatus::Preloaded;
                }
                debug!(agent_id, "lazy agent preloaded");
                self.emit(EventKind::AgentPreloaded, agent_id, serde_json::Value::Null);
                Ok(true)
            }
            Err(e) => {
                if let Some(mut lazy) = self.lazy_agents.get_mut(agent_id) {
                    lazy.status = LazyAgentStatus::Error;
                }
                error!(agent_id, error = %e, "lazy agent preload failed");
                self.emit(
                    EventKind::AgentError,
                    agent_id,
                    serde_json::json!({ "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Preload the `count` highest-priority inactive lazy agents.
    pub async fn preload_top_agents(&self, count: usize) -> usize {
        let candidates: Vec<AgentId> = self
            .list_lazy_agents()
            .into_iter()
            .filter(|lazy| lazy.status == LazyAgentStatus::Inactive)
            .take(count)
            .map(|lazy| lazy.id)
            .collect();

        let mut preloaded = 0;
        for agent_id in candidates {
            match self.preload_agent(&agent_id).await {
                Ok(true) => preloaded += 1,
                Ok(false) => {}
                Err(e) => warn!(agent_id = %agent_id, error = %e, "preload failed"),
            }
        }
        preloaded
    }

    /// Activate every lazy agent whose character is flagged default, highest priority first.
    pub async fn activate_auto_start_agents(&self) -> Vec<AgentId> {
        let candidates: Vec<AgentId> = self
            .list_lazy_agents()
            .into_iter()
            .filter(|lazy| lazy.character.is_default)
            .map(|lazy| lazy.id)
            .collect();

        let mut activated = Vec::new();
        for agent_id in candidates {
            match self.activate_agent(&agent_id).await {
                Ok(_) => activated.push(agent_id),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "auto-start activation failed"),
            }
        }
        activated
    }

    /// Deactivate every lazy-managed agent idle for longer than `max_inactive`.
    /// Returns the number deactivated.
    pub async fn unload_inactive_agents(&self, max_inactive: Duration) -> usize {
        let now = Utc::now();
        let threshold_ms = i64::try_from(max_inactive.as_millis()).unwrap_or(i64::MAX);

        let idle: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|entry| self.lazy_agents.contains_key(entry.key()))
            .filter(|entry| (now - entry.value().last_activity()).num_milliseconds() > threshold_ms)
            .map(|entry| entry.key().clone())
            .collect();

        let mut unloaded = 0;
        for agent_id in idle {
            if self.deactivate_agent(&agent_id).await {
                unloaded += 1;
            }
        }
        if unloaded > 0 {
            info!(unloaded, "unloaded inactive agents");
        }
        unloaded
    }

    /// Ranking score for activation / preload ordering.
    pub fn calculate_agent_priority(character: &CharacterConfig) -> u32 {
        let mut priority = 0;
        if character.is_default {
            priority += PRIORITY_DEFAULT;
        }
        if !character.extensions.is_empty() {
            priority += PRIORITY_EXTENSIONS;
        }
        if character.autonomous.enabled {
            priority += PRIORITY_AUTONOMOUS;
        }
        if character
            .memory
            .as_ref()
            .is_some_and(|memory| !memory.provider.is_empty())
        {
            priority += PRIORITY_MEMORY;
        }
        priority
    }

    /// Give one agent its scheduling cycle. Failures are logged, never propagated.
    pub async fn process_agent_tick(&self, agent: &Arc<dyn Agent>) -> bool {
        match agent.tick().await {
            Ok(()) => true,
            Err(e) => {
                error!(agent_id = %agent.id(), error = %e, "agent tick failed");
                false
            }
        }
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_id).map(|a| Arc::clone(a.value()))
    }

    pub fn get_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.iter().map(|a| Arc::clone(a.value())).collect()
    }

    pub fn is_agent_active(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn is_lazy_managed(&self, agent_id: &str) -> bool {
        self.lazy_agents.contains_key(agent_id)
    }

    pub fn active_count(&self) -> usize {
        self.agents.len()
    }

    pub fn get_lazy_agent(&self, agent_id: &str) -> Option<LazyAgent> {
        self.lazy_agents.get(agent_id).map(|l| l.value().clone())
    }

    /// All lazy descriptors, highest priority first (ties by id).
    pub fn list_lazy_agents(&self) -> Vec<LazyAgent> {
        let mut lazy: Vec<LazyAgent> = self
            .lazy_agents
            .iter()
            .map(|l| l.value().clone())
            .collect();
        lazy.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        lazy
    }

    pub fn lazy_agent_ids(&self) -> Vec<AgentId> {
        self.list_lazy_agents().into_iter().map(|l| l.id).collect()
    }

    pub fn get_status_summary(&self) -> AgentManagerSummary {
        let mut summary = AgentManagerSummary {
            active: self.agents.len(),
            lazy_total: self.lazy_agents.len(),
            ..Default::default()
        };
        for lazy in self.lazy_agents.iter() {
            *summary
                .lazy_by_status
                .entry(lazy.status.to_string())
                .or_default() += 1;
        }
        for agent in self.agents.iter() {
            *summary
                .active_by_status
                .entry(agent.status().to_string())
                .or_default() += 1;
        }
        summary
    }

    /// Clean up every active agent and return lazy descriptors to `Inactive`.
    pub async fn shutdown(&self) {
        let ids: Vec<AgentId> = self.agents.iter().map(|a| a.key().clone()).collect();
        info!(agents = ids.len(), "shutting down agent manager");

        for agent_id in ids {
            let _guard = self.lock_lifecycle(&agent_id).await;
            if let Some((_, agent)) = self.agents.remove(&agent_id) {
                Self::cleanup_quietly(&agent).await;
            }
            if let Some(mut lazy) = self.lazy_agents.get_mut(&agent_id) {
                if lazy.status == LazyAgentStatus::Active {
                    lazy.status = LazyAgentStatus::Inactive;
                }
            }
        }
    }
}
