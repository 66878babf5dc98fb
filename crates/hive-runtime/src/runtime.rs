//! The assembled runtime: event bus, agent manager, integration coordinator,
//! metrics collector and tick driver, wired from one [`HiveConfig`].

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hive_config::HiveConfig;
use hive_core::{
    AgentFactory, AgentId, Event, EventBus, EventKind, HiveError, MetricsSink, Result,
    ToolRegistry,
};

use crate::context::{ContextBootstrapper, InMemoryContextBootstrapper};
use crate::integration::IntegrationCoordinator;
use crate::manager::AgentManager;
use crate::metrics::RuntimeMetricsCollector;
use crate::tick::TickDriver;

/// What [`Runtime::apply_config`] changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadReport {
    pub rescheduled: bool,
    /// Characters seen for the first time.
    pub added: Vec<AgentId>,
    /// Characters whose descriptor was replaced.
    pub refreshed: usize,
    pub activated: Vec<AgentId>,
}

/// What `start` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartupReport {
    pub registered: usize,
    pub preloaded: usize,
    pub activated: Vec<AgentId>,
}

pub struct RuntimeBuilder {
    config: HiveConfig,
    factory: Option<Arc<dyn AgentFactory>>,
    bootstrapper: Option<Arc<dyn ContextBootstrapper>>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
}

impl RuntimeBuilder {
    pub fn factory(mut self, factory: Arc<dyn AgentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replace the built-in tiered context system.
    pub fn context_bootstrapper(mut self, bootstrapper: Arc<dyn ContextBootstrapper>) -> Self {
        self.bootstrapper = Some(bootstrapper);
        self
    }

    pub fn tool_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    pub fn build(self) -> Runtime {
        let config = self.config;
        let event_bus = EventBus::new(config.runtime.event_bus_capacity.max(1));

        let manager = Arc::new(AgentManager::new(event_bus.clone()));
        if let Some(factory) = self.factory {
            manager.set_agent_factory(factory);
        }

        let metrics = Arc::new(RuntimeMetricsCollector::new(config.metrics.clone()));
        manager.set_metrics_sink(Arc::clone(&metrics) as Arc<dyn MetricsSink>);

        let bootstrapper = self.bootstrapper.or_else(|| {
            config.context.enabled.then(|| {
                Arc::new(InMemoryContextBootstrapper::new(config.context.clone()))
                    as Arc<dyn ContextBootstrapper>
            })
        });

        let mut coordinator = IntegrationCoordinator::new(
            Arc::clone(&manager),
            config.autonomy.clone(),
            config.context.clone(),
        )
        .with_metrics(Arc::clone(&metrics));
        if let Some(bootstrapper) = bootstrapper {
            coordinator = coordinator.with_bootstrapper(bootstrapper);
        }
        if let Some(registry) = self.tool_registry {
            coordinator = coordinator.with_tool_registry(registry);
        }

        let driver = Arc::new(
            TickDriver::new(Arc::clone(&manager), &config.runtime, &config.lazy)
                .with_metrics(Arc::clone(&metrics)),
        );

        Runtime {
            config: RwLock::new(config),
            event_bus,
            manager,
            coordinator: Arc::new(coordinator),
            metrics,
            driver,
            driver_handle: Mutex::new(None),
        }
    }
}

pub struct Runtime {
    config: RwLock<HiveConfig>,
    event_bus: EventBus,
    manager: Arc<AgentManager>,
    coordinator: Arc<IntegrationCoordinator>,
    metrics: Arc<RuntimeMetricsCollector>,
    driver: Arc<TickDriver>,
    driver_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    pub fn builder(config: HiveConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            factory: None,
            bootstrapper: None,
            tool_registry: None,
        }
    }

    /// Initialize subsystems, register configured characters, preload and
    /// auto-start agents, then start the scheduling loop.
    pub async fn start(&self) -> Result<StartupReport> {
        if !self.manager.has_factory() {
            return Err(HiveError::FactoryNotConfigured);
        }
        self.coordinator.initialize().await;
        self.coordinator.spawn_event_router(&self.event_bus);
        self.metrics.start();

        let config = self.config();
        let mut report = StartupReport::default();
        for character in config.characters {
            self.manager.register_lazy_agent(character);
            report.registered += 1;
        }

        if config.lazy.preload_count > 0 {
            report.preloaded = self
                .manager
                .preload_top_agents(config.lazy.preload_count)
                .await;
        }
        report.activated = self.manager.activate_auto_start_agents().await;

        let handle = tokio::spawn(Arc::clone(&self.driver).run());
        if let Some(previous) = self.driver_handle.lock().replace(handle) {
            warn!("runtime started twice, previous tick driver detached");
            previous.abort();
        }

        info!(
            registered = report.registered,
            preloaded = report.preloaded,
            activated = report.activated.len(),
            "runtime started"
        );
        Ok(report)
    }

    /// Stop the scheduling loop, then every subsystem. Errors are logged, never returned.
    pub async fn shutdown(&self) {
        info!("runtime shutting down");
        self.event_bus.emit(Event::new(EventKind::Shutdown));

        self.driver.stop();
        let handle = self.driver_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "tick driver ended abnormally");
            }
        }

        self.coordinator.shutdown().await;
        self.manager.shutdown().await;
        self.metrics.stop().await;
        info!("runtime stopped");
    }

    /// Apply a reloaded config to the running runtime.
    ///
    /// Tick and unload intervals and autonomy settings take effect at once.
    /// Configured characters are registered or refreshed; new ones marked
    /// `default` are activated. Characters dropped from the file stay
    /// registered. Event bus capacity, metrics and context settings are fixed
    /// at build time.
    pub async fn apply_config(&self, config: HiveConfig) -> ReloadReport {
        let mut report = ReloadReport {
            rescheduled: self.driver.reconfigure(&config.runtime, &config.lazy),
            ..Default::default()
        };
        self.coordinator.set_autonomy(config.autonomy.clone());

        let mut auto_start = Vec::new();
        for character in &config.characters {
            let is_new = self.manager.get_lazy_agent(&character.id).is_none();
            if is_new {
                report.added.push(character.id.clone());
                if character.is_default {
                    auto_start.push(character.id.clone());
                }
            } else {
                report.refreshed += 1;
            }
            self.manager.register_lazy_agent(character.clone());
        }

        for agent_id in auto_start {
            match self.manager.activate_agent(&agent_id).await {
                Ok(_) => report.activated.push(agent_id),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "auto-start activation failed"),
            }
        }

        *self.config.write() = config;
        info!(
            rescheduled = report.rescheduled,
            added = report.added.len(),
            refreshed = report.refreshed,
            activated = report.activated.len(),
            "runtime config applied"
        );
        report
    }

    /// Snapshot of the config currently in effect.
    pub fn config(&self) -> HiveConfig {
        self.config.read().clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    pub fn coordinator(&self) -> &Arc<IntegrationCoordinator> {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<RuntimeMetricsCollector> {
        &self.metrics
    }

    pub fn driver(&self) -> &Arc<TickDriver> {
        &self.driver
    }
}
