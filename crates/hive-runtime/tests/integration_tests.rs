#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use hive_config::{AutonomyConfig, ContextConfig};
    use hive_core::{
        ActionCandidate, Agent, AgentConfig, AutonomousSettings, CharacterConfig, Event,
        EventBus, EventKind, HiveError, Result, Tool, ToolRegistry,
    };
    use hive_runtime::context::{
        AgentProfile, BootstrapOutcome, CacheTier, ContextBootstrapper, ContextManager,
        ContextService, ContextStats, EnrichmentRequest, InMemoryContextBootstrapper,
        ThoughtContext,
    };
    use hive_runtime::{AgentManager, IntegrationCoordinator, MockFactory, RuntimeMetricsCollector};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // ── Test collaborators ─────────────────────────────────────

    /// Bootstrapper that always errors, counting shutdown calls.
    #[derive(Default)]
    struct BrokenBootstrapper {
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl ContextBootstrapper for BrokenBootstrapper {
        async fn bootstrap(&self) -> Result<BootstrapOutcome> {
            Err(anyhow::anyhow!("vector store unreachable").into())
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Bootstrapper that reports an unsuccessful outcome without erroring.
    struct UnsuccessfulBootstrapper;

    #[async_trait]
    impl ContextBootstrapper for UnsuccessfulBootstrapper {
        async fn bootstrap(&self) -> Result<BootstrapOutcome> {
            Ok(BootstrapOutcome::failed("no embedding model"))
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Context manager whose enrichment always fails.
    struct FlakyContextManager;

    #[async_trait]
    impl ContextManager for FlakyContextManager {
        async fn enrich(
            &self,
            _base: &ThoughtContext,
            _request: &EnrichmentRequest,
        ) -> Result<ThoughtContext> {
            Err(HiveError::Context("enrichment timed out".into()))
        }

        async fn register_agent(&self, _profile: AgentProfile) -> Result<()> {
            Err(HiveError::Context("registry offline".into()))
        }

        async fn unregister_agent(&self, _agent_id: &str) -> Result<()> {
            Err(HiveError::Context("registry offline".into()))
        }

        fn stats(&self) -> ContextStats {
            ContextStats::default()
        }
    }

    #[async_trait]
    impl ContextService for FlakyContextManager {
        async fn shutdown(&self) -> Result<()> {
            Err(HiveError::Context("already gone".into()))
        }
    }

    struct FlakyBootstrapper;

    #[async_trait]
    impl ContextBootstrapper for FlakyBootstrapper {
        async fn bootstrap(&self) -> Result<BootstrapOutcome> {
            let manager = Arc::new(FlakyContextManager);
            Ok(BootstrapOutcome {
                success: true,
                context_manager: Some(manager.clone()),
                runtime_adapter: Some(manager),
                error: None,
            })
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRegistry {
        tools: Mutex<Vec<(String, Tool)>>,
        fail: bool,
    }

    #[async_trait]
    impl ToolRegistry for RecordingRegistry {
        async fn register_tool(&self, id: &str, tool: Tool) -> Result<()> {
            if self.fail {
                return Err(HiveError::Tool {
                    tool: id.to_string(),
                    reason: "registry sealed".into(),
                });
            }
            self.tools.lock().push((id.to_string(), tool));
            Ok(())
        }
    }

    // ── Helpers ────────────────────────────────────────────────

    fn character(id: &str) -> CharacterConfig {
        CharacterConfig::new(id, id.to_uppercase())
    }

    fn autonomous_character(id: &str, interval_ms: u64) -> CharacterConfig {
        let mut c = character(id);
        c.autonomous = AutonomousSettings {
            enabled: true,
            interval_ms: Some(interval_ms),
        };
        c
    }

    fn setup(factory: MockFactory) -> (Arc<MockFactory>, Arc<AgentManager>) {
        let factory = Arc::new(factory);
        let manager = Arc::new(AgentManager::with_factory(
            EventBus::new(256),
            factory.clone(),
        ));
        (factory, manager)
    }

    fn coordinator(manager: &Arc<AgentManager>) -> IntegrationCoordinator {
        IntegrationCoordinator::new(
            Arc::clone(manager),
            AutonomyConfig::default(),
            ContextConfig::default(),
        )
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    // ── Initialization ─────────────────────────────────────────

    mod initialize {
        use super::*;

        #[tokio::test]
        async fn test_failing_bootstrap_degrades_to_base_context() {
            let (_factory, manager) = setup(MockFactory::new().with_memories(&["hello"]));
            let bootstrapper = Arc::new(BrokenBootstrapper::default());
            let coordinator = coordinator(&manager).with_bootstrapper(bootstrapper.clone());

            coordinator.initialize().await;
            assert!(!coordinator.has_context_manager());
            assert!(coordinator.get_context_stats().is_none());

            let agent = manager
                .create_agent(AgentConfig::from_character(&character("nyx")))
                .await
                .unwrap();
            let context = coordinator.create_agent_context(&agent).await;
            assert!(!context.is_enriched());
            assert_eq!(context.agent_id, "nyx");
            assert_eq!(context.memories.len(), 1);

            coordinator.shutdown().await;
            assert_eq!(bootstrapper.shutdowns.load(Ordering::Relaxed), 1);
        }

        #[tokio::test]
        async fn test_unsuccessful_outcome_degrades() {
            let (_factory, manager) = setup(MockFactory::new());
            let coordinator =
                coordinator(&manager).with_bootstrapper(Arc::new(UnsuccessfulBootstrapper));
            coordinator.initialize().await;
            assert!(!coordinator.has_context_manager());
        }

        #[tokio::test]
        async fn test_no_subsystems_is_fine() {
            let (_factory, manager) = setup(MockFactory::new());
            let coordinator = coordinator(&manager);
            coordinator.initialize().await;
            coordinator.shutdown().await;
        }

        #[tokio::test]
        async fn test_registers_runtime_tools() {
            let (_factory, manager) = setup(MockFactory::new());
            let registry = Arc::new(RecordingRegistry::default());
            let coordinator = coordinator(&manager).with_tool_registry(registry.clone());
            coordinator.initialize().await;

            let tools = registry.tools.lock();
            let ids: Vec<&str> = tools.iter().map(|(id, _)| id.as_str()).collect();
            assert_eq!(ids, vec!["runtime.autonomous_status", "runtime.agent_context"]);
            assert!(tools.iter().all(|(_, t)| !t.is_mutating));
            assert_eq!(tools[0].1.parameters["required"][0], "agent_id");
        }

        #[tokio::test]
        async fn test_tool_registration_failure_is_not_fatal() {
            let (_factory, manager) = setup(MockFactory::new());
            let registry = Arc::new(RecordingRegistry {
                fail: true,
                ..Default::default()
            });
            let coordinator = coordinator(&manager)
                .with_tool_registry(registry.clone())
                .with_bootstrapper(Arc::new(InMemoryContextBootstrapper::new(
                    ContextConfig::default(),
                )));
            coordinator.initialize().await;
            assert!(registry.tools.lock().is_empty());
            // The context system still came up.
            assert!(coordinator.has_context_manager());
        }
    }

    // ── Context ────────────────────────────────────────────────

    mod context {
        use super::*;

        async fn ready(factory: MockFactory) -> (Arc<AgentManager>, IntegrationCoordinator) {
            let (_factory, manager) = setup(factory);
            let coordinator = coordinator(&manager).with_bootstrapper(Arc::new(
                InMemoryContextBootstrapper::new(ContextConfig::default()),
            ));
            coordinator.initialize().await;
            (manager, coordinator)
        }

        #[tokio::test]
        async fn test_context_is_enriched() {
            let (manager, coordinator) = ready(
                MockFactory::new()
                    .with_memories(&["met aria", "shipped release"])
                    .with_emotion("calm", 0.2),
            )
            .await;
            let agent = manager
                .create_agent(AgentConfig::from_character(&character("nyx")))
                .await
                .unwrap();

            let context = coordinator.create_agent_context(&agent).await;
            let enrichment = context.enrichment.clone().unwrap();
            assert_eq!(enrichment.depth, 3);
            assert_eq!(enrichment.tier, CacheTier::Computed);
            assert!(enrichment.memory_summary.unwrap().contains("met aria"));
            assert_eq!(enrichment.emotional_tone.as_deref(), Some("mildly calm"));
            assert_eq!(enrichment.environment.unwrap()["active_agents"], 1);
            assert_eq!(context.environment.active_agents, 1);

            let again = coordinator.create_agent_context(&agent).await;
            assert_eq!(again.enrichment.unwrap().tier, CacheTier::L1);
            let stats = coordinator.get_context_stats().unwrap();
            assert_eq!(stats.l1_hits, 1);
            assert_eq!(stats.misses, 1);
        }

        #[tokio::test]
        async fn test_register_and_unregister_profile() {
            let (manager, coordinator) = ready(MockFactory::new()).await;
            let agent = manager
                .create_agent(AgentConfig::from_character(&character("nyx")))
                .await
                .unwrap();

            coordinator.register_agent_with_context(&agent).await;
            assert_eq!(coordinator.get_context_stats().unwrap().registered_agents, 1);
            coordinator.unregister_agent_from_context("nyx").await;
            assert_eq!(coordinator.get_context_stats().unwrap().registered_agents, 0);
        }

        #[tokio::test]
        async fn test_enrichment_failure_falls_back() {
            let (_factory, manager) = setup(MockFactory::new());
            let coordinator = coordinator(&manager).with_bootstrapper(Arc::new(FlakyBootstrapper));
            coordinator.initialize().await;
            assert!(coordinator.has_context_manager());

            let agent = manager
                .create_agent(AgentConfig::from_character(&character("nyx")))
                .await
                .unwrap();
            let context = coordinator.create_agent_context(&agent).await;
            assert!(!context.is_enriched());
            assert_eq!(context.agent_id, "nyx");

            // Registration errors are swallowed too, and so is a failing service shutdown.
            coordinator.register_agent_with_context(&agent).await;
            coordinator.unregister_agent_from_context("nyx").await;
            coordinator.shutdown().await;
            assert!(!coordinator.has_context_manager());
        }
    }

    // ── Autonomous systems ─────────────────────────────────────

    mod autonomous {
        use super::*;

        fn candidates() -> Vec<ActionCandidate> {
            vec![
                ActionCandidate::new("post_update", 0.9, 0.8),
                ActionCandidate::new("rest", 0.2, 0.2),
            ]
        }

        #[tokio::test(start_paused = true)]
        async fn test_start_is_idempotent() {
            let (_factory, manager) = setup(MockFactory::new());
            manager.register_lazy_agent(autonomous_character("nyx", 1_000));
            manager.activate_agent("nyx").await.unwrap();
            let coordinator = coordinator(&manager);

            assert!(coordinator.start_autonomous_systems("nyx"));
            assert!(!coordinator.start_autonomous_systems("nyx"));
            assert_eq!(coordinator.autonomous_agent_count(), 1);

            let status = coordinator.get_autonomous_status("nyx");
            assert!(status.has_autonomous_engine);
            assert!(status.has_decision_engine);
            assert!(status.is_running);
            assert_eq!(status.interval_ms, Some(1_000));
            assert_eq!(status.autonomous_agent_count, 1);

            assert!(coordinator.stop_autonomous_systems("nyx").await);
            assert!(!coordinator.stop_autonomous_systems("nyx").await);
            let status = coordinator.get_autonomous_status("nyx");
            assert!(!status.has_autonomous_engine);
            assert!(!status.has_decision_engine);
            assert_eq!(status.autonomous_agent_count, 0);
            assert!(coordinator.autonomous_agent("nyx").is_none());
        }

        #[tokio::test]
        async fn test_start_requires_active_agent() {
            let (_factory, manager) = setup(MockFactory::new());
            manager.register_lazy_agent(autonomous_character("nyx", 1_000));
            let coordinator = coordinator(&manager);
            assert!(!coordinator.start_autonomous_systems("nyx"));
            assert_eq!(coordinator.autonomous_agent_count(), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_cycles_execute_decisions() {
            let (factory, manager) = setup(MockFactory::new().with_candidates(candidates()));
            manager.register_lazy_agent(autonomous_character("nyx", 1_000));
            manager.activate_agent("nyx").await.unwrap();
            let coordinator = coordinator(&manager);
            coordinator.start_autonomous_systems("nyx");

            tokio::time::sleep(Duration::from_millis(3_500)).await;

            let decisions = factory.agent("nyx").unwrap().decisions();
            assert!(decisions.len() >= 2);
            assert!(decisions.iter().all(|d| d.action == "post_update"));
            let status = coordinator.get_autonomous_status("nyx");
            assert!(status.cycles_completed >= 2);
            assert_eq!(status.decisions_made, decisions.len() as u64);

            coordinator.shutdown().await;
            assert_eq!(coordinator.autonomous_agent_count(), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_default_interval_applies() {
            let (_factory, manager) = setup(MockFactory::new());
            manager
                .create_agent(AgentConfig::from_character(&character("perm")))
                .await
                .unwrap();
            let coordinator = coordinator(&manager);
            coordinator.start_autonomous_systems("perm");
            assert_eq!(
                coordinator.get_autonomous_status("perm").interval_ms,
                Some(AutonomyConfig::default().default_interval_ms)
            );
            coordinator.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_zero_default_interval_is_clamped() {
            let (factory, manager) = setup(MockFactory::new().with_candidates(candidates()));
            manager
                .create_agent(AgentConfig::from_character(&character("perm")))
                .await
                .unwrap();
            let coordinator = IntegrationCoordinator::new(
                Arc::clone(&manager),
                AutonomyConfig {
                    default_interval_ms: 0,
                    ..Default::default()
                },
                ContextConfig::default(),
            );

            assert!(coordinator.start_autonomous_systems("perm"));
            assert_eq!(coordinator.get_autonomous_status("perm").interval_ms, Some(1));

            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(coordinator.get_autonomous_status("perm").cycles_completed >= 1);
            assert!(!factory.agent("perm").unwrap().decisions().is_empty());
            coordinator.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_autonomy_settings_apply_to_later_starts() {
            let (_factory, manager) = setup(MockFactory::new());
            for id in ["early", "late"] {
                manager
                    .create_agent(AgentConfig::from_character(&character(id)))
                    .await
                    .unwrap();
            }
            let coordinator = coordinator(&manager);
            coordinator.start_autonomous_systems("early");

            coordinator.set_autonomy(AutonomyConfig {
                default_interval_ms: 5_000,
                ..Default::default()
            });
            assert_eq!(coordinator.autonomy().default_interval_ms, 5_000);
            coordinator.start_autonomous_systems("late");

            assert_eq!(
                coordinator.get_autonomous_status("early").interval_ms,
                Some(AutonomyConfig::default().default_interval_ms)
            );
            assert_eq!(coordinator.get_autonomous_status("late").interval_ms, Some(5_000));
            coordinator.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_interrupt_reaches_agent() {
            let (factory, manager) = setup(MockFactory::new());
            manager.register_lazy_agent(autonomous_character("nyx", 60_000));
            manager.activate_agent("nyx").await.unwrap();
            let coordinator = coordinator(&manager);
            coordinator.start_autonomous_systems("nyx");

            let event = Event::for_agent(EventKind::MessageReceived, "nyx")
                .with_data(serde_json::json!({ "text": "ping" }));
            assert!(coordinator.interrupt_autonomous_agent("nyx", event));
            assert!(!coordinator.interrupt_autonomous_agent(
                "ghost",
                Event::new(EventKind::MessageReceived)
            ));

            let agent = factory.agent("nyx").unwrap();
            eventually(|| agent.received_events().len() == 1).await;
            assert_eq!(agent.received_events()[0].data["text"], "ping");
            assert_eq!(coordinator.get_autonomous_status("nyx").interrupts_handled, 1);
            coordinator.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_handled_interrupts_count_as_messages() {
            let (factory, manager) = setup(MockFactory::new());
            manager.register_lazy_agent(autonomous_character("nyx", 60_000));
            manager.activate_agent("nyx").await.unwrap();
            let metrics = Arc::new(RuntimeMetricsCollector::new(Default::default()));
            let coordinator = coordinator(&manager).with_metrics(metrics.clone());
            coordinator.start_autonomous_systems("nyx");

            for text in ["ping", "pong"] {
                coordinator.interrupt_autonomous_agent(
                    "nyx",
                    Event::for_agent(EventKind::MessageReceived, "nyx")
                        .with_data(serde_json::json!({ "text": text })),
                );
            }
            let agent = factory.agent("nyx").unwrap();
            eventually(|| agent.received_events().len() == 2).await;

            let snapshot = metrics.get_metrics();
            assert_eq!(snapshot.messages_processed, 2);
            assert!(snapshot.average_response_time_ms >= 0.0);
            coordinator.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_interrupt_preempts_cycle() {
            let (factory, manager) = setup(
                MockFactory::new()
                    .with_candidates(candidates())
                    .with_cycle_delay(Duration::from_secs(10)),
            );
            manager.register_lazy_agent(autonomous_character("nyx", 1_000));
            manager.activate_agent("nyx").await.unwrap();
            let coordinator = coordinator(&manager);
            coordinator.start_autonomous_systems("nyx");

            // First cycle starts at 1s and is still deliberating at 1.5s.
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            assert!(coordinator.interrupt_autonomous_agent(
                "nyx",
                Event::for_agent(EventKind::Custom("discord.mention".into()), "nyx"),
            ));
            tokio::time::sleep(Duration::from_millis(100)).await;

            let agent = factory.agent("nyx").unwrap();
            assert_eq!(agent.received_events().len(), 1);
            assert!(agent.decisions().is_empty());
            let status = coordinator.get_autonomous_status("nyx");
            assert_eq!(status.cycles_completed, 0);
            assert_eq!(status.interrupts_handled, 1);
            coordinator.shutdown().await;
        }
    }

    // ── Event routing ──────────────────────────────────────────

    mod routing {
        use super::*;

        #[tokio::test]
        async fn test_lifecycle_events_drive_autonomy() {
            let (factory, manager) = setup(MockFactory::new());
            let coordinator = Arc::new(coordinator(&manager));
            coordinator.spawn_event_router(manager.event_bus());

            manager.register_lazy_agent(autonomous_character("auto", 60_000));
            manager.register_lazy_agent(character("plain"));
            manager.activate_agent("auto").await.unwrap();
            manager.activate_agent("plain").await.unwrap();

            eventually(|| coordinator.autonomous_agent_count() == 1).await;
            assert_eq!(coordinator.autonomous_agent_ids(), vec!["auto"]);

            manager
                .event_bus()
                .emit(Event::for_agent(EventKind::MessageReceived, "auto"));
            let agent = factory.agent("auto").unwrap();
            eventually(|| agent.received_events().len() == 1).await;
            assert_eq!(agent.received_events()[0].kind, EventKind::MessageReceived);

            manager.deactivate_agent("auto").await;
            eventually(|| coordinator.autonomous_agent_count() == 0).await;

            coordinator.shutdown().await;
        }

        #[tokio::test]
        async fn test_autonomy_disabled_globally() {
            let (_factory, manager) = setup(MockFactory::new());
            let coordinator = Arc::new(IntegrationCoordinator::new(
                Arc::clone(&manager),
                AutonomyConfig {
                    enabled: false,
                    ..Default::default()
                },
                ContextConfig::default(),
            ));
            coordinator.spawn_event_router(manager.event_bus());

            manager.register_lazy_agent(autonomous_character("auto", 60_000));
            manager.activate_agent("auto").await.unwrap();
            coordinator
                .handle_event(&Event::for_agent(EventKind::AgentActivated, "auto"))
                .await;
            assert_eq!(coordinator.autonomous_agent_count(), 0);
            coordinator.shutdown().await;
        }

        #[tokio::test]
        async fn test_removal_stops_autonomy() {
            let (_factory, manager) = setup(MockFactory::new());
            let coordinator = coordinator(&manager);
            manager.register_lazy_agent(autonomous_character("auto", 60_000));
            manager.activate_agent("auto").await.unwrap();
            coordinator
                .handle_event(&Event::for_agent(EventKind::AgentActivated, "auto"))
                .await;
            assert_eq!(coordinator.autonomous_agent_count(), 1);

            coordinator
                .handle_event(&Event::for_agent(EventKind::AgentRemoved, "auto"))
                .await;
            assert_eq!(coordinator.autonomous_agent_count(), 0);
        }
    }
}
