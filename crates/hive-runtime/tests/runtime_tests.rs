#[cfg(test)]
mod tests {
    use hive_config::{HiveConfig, LazyConfig, RuntimeConfig};
    use hive_core::{
        AgentConfig, AutonomousSettings, CharacterConfig, Decision, EventBus, HiveError,
    };
    use hive_runtime::{
        AgentManager, HeartbeatFactory, MockFactory, Runtime, RuntimeMetricsCollector, TickDriver,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn character(id: &str) -> CharacterConfig {
        CharacterConfig::new(id, id.to_uppercase())
    }

    // ── Tick driver ────────────────────────────────────────────

    mod tick {
        use super::*;

        fn driver(manager: &Arc<AgentManager>, lazy: LazyConfig) -> TickDriver {
            TickDriver::new(
                Arc::clone(manager),
                &RuntimeConfig {
                    tick_interval_ms: 100,
                    ..Default::default()
                },
                &lazy,
            )
        }

        #[tokio::test]
        async fn test_failing_agent_does_not_block_others() {
            let factory = Arc::new(MockFactory::new().failing_tick_for("grumpy"));
            let manager = Arc::new(AgentManager::with_factory(EventBus::default(), factory.clone()));
            for id in ["grumpy", "calm", "cheerful"] {
                manager
                    .create_agent(AgentConfig::from_character(&character(id)))
                    .await
                    .unwrap();
            }
            let metrics = Arc::new(RuntimeMetricsCollector::new(Default::default()));
            let driver = driver(&manager, LazyConfig::default()).with_metrics(metrics.clone());

            let round = driver.tick_all();
            assert_eq!(round.scheduled, 3);
            assert_eq!(round.skipped, 0);
            assert_eq!(round.join().await, 2);

            for id in ["grumpy", "calm", "cheerful"] {
                assert_eq!(factory.agent(id).unwrap().ticks(), 1);
            }
            assert_eq!(driver.in_flight(), 0);
            assert_eq!(driver.rounds(), 1);
            // Every tick was timed, none left open.
            assert_eq!(metrics.active_timer_count(), 0);
            assert!(metrics.get_performance_stats().peak_response_time_ms >= 0.0);
        }

        #[tokio::test]
        async fn test_empty_registry() {
            let manager = Arc::new(AgentManager::new(EventBus::default()));
            let round = driver(&manager, LazyConfig::default()).tick_all();
            assert_eq!(round.scheduled, 0);
            assert_eq!(round.join().await, 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_run_ticks_and_unloads() {
            let factory = Arc::new(MockFactory::new());
            let manager = Arc::new(AgentManager::with_factory(EventBus::default(), factory.clone()));
            manager.register_lazy_agent(character("sleepy"));
            manager.activate_agent("sleepy").await.unwrap();
            factory
                .agent("sleepy")
                .unwrap()
                .set_last_activity(chrono::Utc::now() - chrono::Duration::hours(1));

            let driver = Arc::new(driver(
                &manager,
                LazyConfig {
                    auto_unload: true,
                    max_inactive_ms: 60_000,
                    unload_check_interval_ms: 1_000,
                    preload_count: 0,
                },
            ));
            let handle = tokio::spawn(Arc::clone(&driver).run());

            tokio::time::sleep(Duration::from_millis(550)).await;
            assert!(factory.agent("sleepy").unwrap().ticks() >= 4);

            tokio::time::sleep(Duration::from_millis(1_000)).await;
            assert!(!manager.is_agent_active("sleepy"));
            assert_eq!(driver.unloaded_total(), 1);

            driver.stop();
            handle.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_auto_unload_disabled() {
            let factory = Arc::new(MockFactory::new());
            let manager = Arc::new(AgentManager::with_factory(EventBus::default(), factory.clone()));
            manager.register_lazy_agent(character("sleepy"));
            manager.activate_agent("sleepy").await.unwrap();
            factory
                .agent("sleepy")
                .unwrap()
                .set_last_activity(chrono::Utc::now() - chrono::Duration::hours(1));

            let driver = Arc::new(driver(
                &manager,
                LazyConfig {
                    auto_unload: false,
                    max_inactive_ms: 60_000,
                    unload_check_interval_ms: 1_000,
                    preload_count: 0,
                },
            ));
            let handle = tokio::spawn(Arc::clone(&driver).run());
            tokio::time::sleep(Duration::from_millis(3_000)).await;
            assert!(manager.is_agent_active("sleepy"));

            driver.stop();
            handle.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_reconfigure_while_running() {
            let factory = Arc::new(MockFactory::new());
            let manager = Arc::new(AgentManager::with_factory(EventBus::default(), factory.clone()));
            manager
                .create_agent(AgentConfig::from_character(&character("steady")))
                .await
                .unwrap();
            let lazy = LazyConfig {
                auto_unload: false,
                ..Default::default()
            };
            let driver = Arc::new(driver(&manager, lazy.clone()));
            let handle = tokio::spawn(Arc::clone(&driver).run());

            tokio::time::sleep(Duration::from_millis(550)).await;
            let agent = factory.agent("steady").unwrap();
            assert!(agent.ticks() >= 5);

            let slower = RuntimeConfig {
                tick_interval_ms: 1_000,
                ..Default::default()
            };
            assert!(driver.reconfigure(&slower, &lazy));
            assert!(!driver.reconfigure(&slower, &lazy));
            assert_eq!(driver.tick_interval(), Duration::from_millis(1_000));

            tokio::time::sleep(Duration::from_millis(10)).await;
            let before = agent.ticks();
            tokio::time::sleep(Duration::from_millis(2_000)).await;
            let delta = agent.ticks() - before;
            assert!((1..=3).contains(&delta), "unexpected tick count {delta}");

            driver.stop();
            handle.await.unwrap();
        }
    }

    // ── Runtime ────────────────────────────────────────────────

    mod runtime {
        use super::*;

        fn config() -> HiveConfig {
            let mut main = character("main");
            main.is_default = true;
            main.autonomous = AutonomousSettings {
                enabled: true,
                interval_ms: Some(60_000),
            };

            let mut config = HiveConfig::default();
            config.characters = vec![main, character("side"), character("spare")];
            config.lazy.preload_count = 1;
            config.metrics.sample_system_resources = false;
            config
        }

        #[tokio::test]
        async fn test_start_requires_factory() {
            let runtime = Runtime::builder(config()).build();
            assert!(matches!(
                runtime.start().await,
                Err(HiveError::FactoryNotConfigured)
            ));
        }

        #[tokio::test]
        async fn test_start_and_shutdown() {
            let runtime = Runtime::builder(config())
                .factory(Arc::new(HeartbeatFactory))
                .build();

            let report = runtime.start().await.unwrap();
            assert_eq!(report.registered, 3);
            assert_eq!(report.activated, vec!["main"]);
            assert_eq!(report.preloaded, 1);
            assert!(runtime.manager().is_agent_active("main"));
            assert!(runtime.coordinator().has_context_manager());
            assert!(runtime.metrics().is_running());

            for _ in 0..200 {
                if runtime.coordinator().autonomous_agent_count() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(runtime.coordinator().autonomous_agent_ids(), vec!["main"]);

            runtime.shutdown().await;
            assert_eq!(runtime.manager().active_count(), 0);
            assert_eq!(runtime.coordinator().autonomous_agent_count(), 0);
            assert!(!runtime.metrics().is_running());
        }

        #[tokio::test]
        async fn test_context_disabled() {
            let mut config = config();
            config.context.enabled = false;
            let runtime = Runtime::builder(config)
                .factory(Arc::new(HeartbeatFactory))
                .build();
            runtime.start().await.unwrap();
            assert!(!runtime.coordinator().has_context_manager());
            runtime.shutdown().await;
        }

        #[tokio::test]
        async fn test_agent_work_lands_in_runtime_metrics() {
            let runtime = Runtime::builder(config())
                .factory(Arc::new(HeartbeatFactory))
                .build();
            runtime.start().await.unwrap();

            let main = runtime.manager().get_agent("main").unwrap();
            main.execute_decision(&Decision {
                agent_id: "main".into(),
                action: "reflect".into(),
                score: 0.3,
                params: serde_json::Value::Null,
                decided_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

            let current = runtime.metrics().get_metrics();
            assert!(current.memories_stored >= 1);
            assert!(current.plan_steps_executed >= 1);
            assert!(current.emotion_changes >= 1);
            runtime.shutdown().await;
        }

        #[tokio::test]
        async fn test_apply_config_while_running() {
            let runtime = Runtime::builder(config())
                .factory(Arc::new(HeartbeatFactory))
                .build();
            runtime.start().await.unwrap();
            assert_eq!(runtime.driver().tick_interval(), Duration::from_millis(1_000));

            let mut fresh = character("fresh");
            fresh.is_default = true;
            let mut reloaded = config();
            reloaded.characters.push(fresh);
            reloaded.runtime.tick_interval_ms = 250;
            reloaded.autonomy.default_interval_ms = 5_000;

            let report = runtime.apply_config(reloaded).await;
            assert!(report.rescheduled);
            assert_eq!(report.added, vec!["fresh"]);
            assert_eq!(report.refreshed, 3);
            assert_eq!(report.activated, vec!["fresh"]);

            assert!(runtime.manager().is_agent_active("fresh"));
            assert_eq!(runtime.driver().tick_interval(), Duration::from_millis(250));
            assert_eq!(runtime.coordinator().autonomy().default_interval_ms, 5_000);
            assert_eq!(runtime.config().characters.len(), 4);

            // Same config again changes nothing.
            let report = runtime.apply_config(runtime.config()).await;
            assert!(!report.rescheduled);
            assert!(report.added.is_empty());
            assert_eq!(report.refreshed, 4);

            runtime.shutdown().await;
        }
    }
}
