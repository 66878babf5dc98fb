//! # Integration Coordinator
//!
//! Orchestrates the optional subsystems that sit around the agent registries:
//!
//! - **Context system** — bootstrapped best-effort; when absent or failing,
//!   agents reason over the unenriched base context.
//! - **Tool system** — the runtime's own tools are registered with the module
//!   registry if one is injected.
//! - **Autonomous systems** — one [`AutonomousEngine`] + [`DecisionEngine`]
//!   pair per agent, held in a single record so the two cannot drift.
//! - **Event routing** — lifecycle events start/stop autonomous systems, every
//!   other agent-addressed event interrupts that agent's autonomous loop.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hive_config::{AutonomyConfig, ContextConfig};
use hive_core::{Agent, AgentId, Event, EventBus, EventKind, Tool, ToolRegistry};

use crate::autonomous::AutonomousEngine;
use crate::context::{
    AgentProfile, AgentStateSnapshot, ContextBootstrapper, ContextManager, ContextService,
    ContextStats, EnrichmentRequest, EnvironmentSnapshot, ThoughtContext,
};
use crate::decision::DecisionEngine;
use crate::manager::AgentManager;
use crate::metrics::RuntimeMetricsCollector;

/// Autonomous state of one agent, for status and monitoring consumers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutonomousStatus {
    pub agent_id: AgentId,
    pub has_autonomous_engine: bool,
    pub has_decision_engine: bool,
    pub is_running: bool,
    pub interval_ms: Option<u64>,
    pub cycles_completed: u64,
    pub interrupts_handled: u64,
    pub decisions_made: u64,
    /// Agents with autonomous systems across the whole runtime.
    pub autonomous_agent_count: usize,
}

/// Everything the coordinator keeps for one autonomous agent.
struct AutonomousRecord {
    agent: Arc<dyn Agent>,
    engine: AutonomousEngine,
    decisions: Arc<DecisionEngine>,
}

struct Router {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct IntegrationCoordinator {
    manager: Arc<AgentManager>,
    autonomy: RwLock<AutonomyConfig>,
    context_config: ContextConfig,
    bootstrapper: Option<Arc<dyn ContextBootstrapper>>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
    metrics: Option<Arc<RuntimeMetricsCollector>>,
    context_manager: RwLock<Option<Arc<dyn ContextManager>>>,
    context_service: RwLock<Option<Arc<dyn ContextService>>>,
    autonomous: DashMap<AgentId, AutonomousRecord>,
    router: Mutex<Option<Router>>,
}

impl IntegrationCoordinator {
    pub fn new(
        manager: Arc<AgentManager>,
        autonomy: AutonomyConfig,
        context_config: ContextConfig,
    ) -> Self {
        Self {
            manager,
            autonomy: RwLock::new(autonomy),
            context_config,
            bootstrapper: None,
            tool_registry: None,
            metrics: None,
            context_manager: RwLock::new(None),
            context_service: RwLock::new(None),
            autonomous: DashMap::new(),
            router: Mutex::new(None),
        }
    }

    pub fn with_bootstrapper(mut self, bootstrapper: Arc<dyn ContextBootstrapper>) -> Self {
        self.bootstrapper = Some(bootstrapper);
        self
    }

    pub fn with_tool_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RuntimeMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Bring up the context and tool systems. Both are optional: failures are
    /// logged and the runtime continues without them.
    pub async fn initialize(&self) {
        self.initialize_context_system().await;
        self.initialize_tool_system().await;
        info!(
            context = self.has_context_manager(),
            tools = self.tool_registry.is_some(),
            "integration coordinator initialized"
        );
    }

    async fn initialize_context_system(&self) {
        let Some(ref bootstrapper) = self.bootstrapper else {
            debug!("no context bootstrapper configured, using base contexts");
            return;
        };

        match bootstrapper.bootstrap().await {
            Ok(outcome) if outcome.success => {
                *self.context_manager.write() = outcome.context_manager;
                *self.context_service.write() = outcome.runtime_adapter;
                info!("context system ready");
            }
            Ok(outcome) => {
                warn!(
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "context system bootstrap unsuccessful, continuing without enrichment"
                );
            }
            Err(e) => {
                warn!(error = %e, "context system bootstrap failed, continuing without enrichment");
            }
        }
    }

    async fn initialize_tool_system(&self) {
        let Some(ref registry) = self.tool_registry else {
            debug!("no tool registry configured, skipping runtime tools");
            return;
        };

        for tool in runtime_tools() {
            let id = tool.name.clone();
            match registry.register_tool(&id, tool).await {
                Ok(()) => debug!(tool = %id, "runtime tool registered"),
                Err(e) => warn!(tool = %id, error = %e, "failed to register runtime tool"),
            }
        }
    }

    /// Stop every autonomous system, the event router and the context system.
    /// Safe to call whether or not `initialize` succeeded.
    pub async fn shutdown(&self) {
        let router = self.router.lock().take();
        if let Some(router) = router {
            router.cancel.cancel();
            if let Err(e) = router.handle.await {
                warn!(error = %e, "event router ended abnormally");
            }
        }

        let ids = self.autonomous_agent_ids();
        futures::future::join_all(ids.iter().map(|id| self.stop_autonomous_systems(id))).await;

        if let Some(ref bootstrapper) = self.bootstrapper {
            if let Err(e) = bootstrapper.shutdown().await {
                error!(error = %e, "context bootstrapper shutdown failed");
            }
        }
        let service = self.context_service.write().take();
        if let Some(service) = service {
            if let Err(e) = service.shutdown().await {
                error!(error = %e, "context service shutdown failed");
            }
        }
        self.context_manager.write().take();

        info!("integration coordinator shut down");
    }

    // ── Context ────────────────────────────────────────────────

    pub fn has_context_manager(&self) -> bool {
        self.context_manager.read().is_some()
    }

    fn context_manager(&self) -> Option<Arc<dyn ContextManager>> {
        self.context_manager.read().clone()
    }

    async fn base_context(&self, agent: &Arc<dyn Agent>) -> ThoughtContext {
        let now = Utc::now();
        ThoughtContext {
            agent_id: agent.id().to_string(),
            state: AgentStateSnapshot {
                name: agent.name().to_string(),
                status: agent.status(),
                last_activity: agent.last_activity(),
                emotion: agent.emotion(),
                extensions: agent
                    .extensions()
                    .into_iter()
                    .filter(|ext| ext.enabled)
                    .map(|ext| ext.name)
                    .collect(),
                portal: agent.portal(),
            },
            environment: EnvironmentSnapshot {
                active_agents: self.manager.active_count(),
                autonomous_agents: self.autonomous.len(),
                timestamp: now,
            },
            events: agent.pending_events(),
            memories: agent
                .recent_memories(self.context_config.recent_memory_limit)
                .await,
            timestamp: now,
            enrichment: None,
        }
    }

    /// Build the thought context for one tick. Enrichment failures fall back to
    /// the base context.
    pub async fn create_agent_context(&self, agent: &Arc<dyn Agent>) -> ThoughtContext {
        let base = self.base_context(agent).await;

        let Some(context_manager) = self.context_manager() else {
            return base;
        };
        let request = EnrichmentRequest::full(self.context_config.max_depth);
        match context_manager.enrich(&base, &request).await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(agent_id = %agent.id(), error = %e, "context enrichment failed, using base context");
                base
            }
        }
    }

    pub async fn register_agent_with_context(&self, agent: &Arc<dyn Agent>) {
        let Some(context_manager) = self.context_manager() else {
            return;
        };
        let traits = self
            .manager
            .get_lazy_agent(agent.id())
            .map(|lazy| lazy.character.traits())
            .unwrap_or_default();
        let profile = AgentProfile {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            traits,
            extensions: agent.extensions().into_iter().map(|ext| ext.name).collect(),
        };
        if let Err(e) = context_manager.register_agent(profile).await {
            warn!(agent_id = %agent.id(), error = %e, "failed to register agent with context system");
        }
    }

    pub async fn unregister_agent_from_context(&self, agent_id: &str) {
        let Some(context_manager) = self.context_manager() else {
            return;
        };
        if let Err(e) = context_manager.unregister_agent(agent_id).await {
            warn!(agent_id, error = %e, "failed to unregister agent from context system");
        }
    }

    pub fn get_context_stats(&self) -> Option<ContextStats> {
        self.context_manager().map(|cm| cm.stats())
    }

    // ── Autonomous systems ─────────────────────────────────────

    pub fn autonomy(&self) -> AutonomyConfig {
        self.autonomy.read().clone()
    }

    /// Replace the autonomy settings. Engines already running keep their
    /// interval; agents started afterwards use the new one.
    pub fn set_autonomy(&self, autonomy: AutonomyConfig) {
        *self.autonomy.write() = autonomy;
    }

    fn autonomous_interval(&self, agent_id: &str) -> Duration {
        let ms = self
            .manager
            .get_lazy_agent(agent_id)
            .and_then(|lazy| lazy.character.autonomous.interval_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or_else(|| self.autonomy.read().default_interval_ms);
        // `tokio::time::interval` panics on zero.
        Duration::from_millis(ms.max(1))
    }

    /// Start the autonomous engine pair for an active agent. Returns `false` if
    /// the agent is not active or already has one.
    pub fn start_autonomous_systems(&self, agent_id: &str) -> bool {
        let Some(agent) = self.manager.get_agent(agent_id) else {
            warn!(agent_id, "cannot start autonomous systems for inactive agent");
            return false;
        };
        let interval = self.autonomous_interval(agent_id);

        match self.autonomous.entry(agent_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(agent_id, "autonomous systems already running");
                false
            }
            Entry::Vacant(slot) => {
                let decisions = Arc::new(DecisionEngine::new(
                    agent_id,
                    self.autonomy.read().min_decision_score,
                ));
                let engine = AutonomousEngine::spawn(
                    Arc::clone(&agent),
                    Arc::clone(&decisions),
                    interval,
                    self.metrics.clone(),
                );
                slot.insert(AutonomousRecord {
                    agent,
                    engine,
                    decisions,
                });
                true
            }
        }
    }

    /// Stop and drop an agent's autonomous engine pair. Returns `false` if it had none.
    pub async fn stop_autonomous_systems(&self, agent_id: &str) -> bool {
        let Some((_, record)) = self.autonomous.remove(agent_id) else {
            return false;
        };
        record.engine.stop().await;
        debug!(
            agent_id,
            decisions = record.decisions.decisions_made(),
            "autonomous systems stopped"
        );
        true
    }

    /// Forward an event into an agent's autonomous loop, preempting its current cycle.
    pub fn interrupt_autonomous_agent(&self, agent_id: &str, event: Event) -> bool {
        match self.autonomous.get(agent_id) {
            Some(record) => record.engine.interrupt(event),
            None => false,
        }
    }

    pub fn get_autonomous_status(&self, agent_id: &str) -> AutonomousStatus {
        let autonomous_agent_count = self.autonomous.len();
        match self.autonomous.get(agent_id) {
            Some(record) => AutonomousStatus {
                agent_id: agent_id.to_string(),
                has_autonomous_engine: true,
                has_decision_engine: true,
                is_running: record.engine.is_running(),
                interval_ms: Some(record.engine.interval().as_millis() as u64),
                cycles_completed: record.engine.cycles_completed(),
                interrupts_handled: record.engine.interrupts_handled(),
                decisions_made: record.decisions.decisions_made(),
                autonomous_agent_count,
            },
            None => AutonomousStatus {
                agent_id: agent_id.to_string(),
                autonomous_agent_count,
                ..Default::default()
            },
        }
    }

    pub fn autonomous_agent_count(&self) -> usize {
        self.autonomous.len()
    }

    pub fn autonomous_agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.autonomous.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The agent instance an autonomous loop is driving.
    pub fn autonomous_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.autonomous
            .get(agent_id)
            .map(|record| Arc::clone(&record.agent))
    }

    // ── Event routing ──────────────────────────────────────────

    /// React to one bus event.
    pub async fn handle_event(&self, event: &Event) {
        let Some(ref agent_id) = event.agent_id else {
            return;
        };

        match event.kind {
            EventKind::AgentCreated | EventKind::AgentActivated => {
                let Some(agent) = self.manager.get_agent(agent_id) else {
                    return;
                };
                self.register_agent_with_context(&agent).await;
                if event.kind == EventKind::AgentActivated && self.wants_autonomy(agent_id) {
                    self.start_autonomous_systems(agent_id);
                }
            }
            EventKind::AgentRemoved | EventKind::AgentDeactivated => {
                self.stop_autonomous_systems(agent_id).await;
                self.unregister_agent_from_context(agent_id).await;
            }
            ref kind if kind.is_lifecycle() => {}
            _ => {
                if self.interrupt_autonomous_agent(agent_id, event.clone()) {
                    debug!(agent_id = %agent_id, event = %event.kind, "routed event to autonomous engine");
                }
            }
        }
    }

    fn wants_autonomy(&self, agent_id: &str) -> bool {
        self.autonomy.read().enabled
            && self
                .manager
                .get_lazy_agent(agent_id)
                .is_some_and(|lazy| lazy.character.autonomous.enabled)
    }

    /// Subscribe to the bus and feed every event through [`handle_event`](Self::handle_event)
    /// until shutdown.
    pub fn spawn_event_router(self: &Arc<Self>, bus: &EventBus) {
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let coordinator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => coordinator.handle_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event router lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("event router stopped");
        });

        let previous = self.router.lock().replace(Router { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }
}

/// Tools the runtime itself exposes to extensions.
fn runtime_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "runtime.autonomous_status".into(),
            description: "Report whether an agent is running autonomously, with cycle and decision counts".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "agent_id": {
                        "type": "string",
                        "description": "Id of the agent to inspect"
                    }
                },
                "required": ["agent_id"]
            }),
            is_mutating: false,
            provider: Some("runtime".into()),
        },
        Tool {
            name: "runtime.agent_context".into(),
            description: "Build the current thought context for an active agent, enriched when a context system is available".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "agent_id": {
                        "type": "string",
                        "description": "Id of the active agent"
                    }
                },
                "required": ["agent_id"]
            }),
            is_mutating: false,
            provider: Some("runtime".into()),
        },
    ]
}
