use hive_config::HiveConfig;
use hive_core::EventBus;
use hive_runtime::{AgentManager, HeartbeatFactory};
use std::sync::Arc;

/// Build the manager `start` would build, without activating anything.
fn registry(config: &HiveConfig) -> AgentManager {
    let manager = AgentManager::with_factory(
        EventBus::new(config.runtime.event_bus_capacity.max(1)),
        Arc::new(HeartbeatFactory),
    );
    for character in &config.characters {
        manager.register_lazy_agent(character.clone());
    }
    manager
}

pub(super) fn cmd_status(config: HiveConfig) -> hive_core::Result<()> {
    let manager = registry(&config);
    let summary = manager.get_status_summary();

    println!("🐝 Hive v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Tick: {}ms   Autonomy: {}   Context: {}   Metrics: {}",
        config.runtime.tick_interval_ms,
        on_off(config.autonomy.enabled),
        on_off(config.context.enabled),
        on_off(config.metrics.enabled),
    );
    println!(
        "   Lazy loading: preload {} · auto-unload {} after {}s",
        config.lazy.preload_count,
        on_off(config.lazy.auto_unload),
        config.lazy.max_inactive_ms / 1000,
    );
    println!();

    if summary.lazy_total == 0 {
        println!("No characters configured. Add [[characters]] to hive.toml.");
        return Ok(());
    }

    println!("\x1b[1mLazy registry\x1b[0m ({} agents)", summary.lazy_total);
    for (status, count) in &summary.lazy_by_status {
        println!("   {status:<12} {count}");
    }
    println!();

    for lazy in manager.list_lazy_agents() {
        let auto = if lazy.character.is_default { " (auto-start)" } else { "" };
        println!(
            "   {:<20} {:<10} priority {:>3}{auto}",
            lazy.id, lazy.status, lazy.priority
        );
    }
    Ok(())
}

pub(super) fn cmd_priority(config: HiveConfig) -> hive_core::Result<()> {
    let mut ranked: Vec<_> = config
        .characters
        .iter()
        .map(|c| (AgentManager::calculate_agent_priority(c), c))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

    if ranked.is_empty() {
        println!("No characters configured.");
        return Ok(());
    }

    let preload = config.lazy.preload_count;
    println!("{:<4} {:<20} {:>8}  flags", "#", "agent", "priority");
    println!("{}", "-".repeat(60));
    for (rank, (priority, character)) in ranked.iter().enumerate() {
        let mut flags = Vec::new();
        if character.is_default {
            flags.push("default");
        }
        if !character.extensions.is_empty() {
            flags.push("extensions");
        }
        if character.autonomous.enabled {
            flags.push("autonomous");
        }
        if character.memory.as_ref().is_some_and(|m| !m.provider.is_empty()) {
            flags.push("memory");
        }
        let marker = if rank < preload { "*" } else { " " };
        println!(
            "{:<4} {:<20} {:>8}  {}{marker}",
            rank + 1,
            character.id,
            priority,
            flags.join(",")
        );
    }
    if preload > 0 {
        println!();
        println!("* preloaded at startup (lazy.preload_count = {preload})");
    }
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
