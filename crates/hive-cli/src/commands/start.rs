use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hive_config::{ConfigLoader, HiveConfig};
use hive_runtime::{HeartbeatFactory, MetricsReport, Runtime};

pub(super) async fn cmd_start(
    config: HiveConfig,
    config_loader: ConfigLoader,
    duration: Option<u64>,
    json: bool,
) -> hive_core::Result<()> {
    println!("🐝 Hive v{}", env!("CARGO_PKG_VERSION"));
    println!("   Characters: {}", config.characters.len());
    println!("   Tick interval: {}ms", config.runtime.tick_interval_ms);
    println!(
        "   Autonomy: {}",
        if config.autonomy.enabled { "enabled" } else { "disabled" }
    );

    // Start config hot-reload watcher (kept alive for duration of runtime)
    let _watcher = match config_loader.watch() {
        Ok(w) => {
            println!("   Config hot-reload: enabled");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };
    println!();

    let runtime = Arc::new(
        Runtime::builder(config)
            .factory(Arc::new(HeartbeatFactory))
            .build(),
    );
    let report = runtime.start().await?;
    let reloads = tokio::spawn(apply_reloads(Arc::clone(&runtime), config_loader));

    println!(
        "   ✅ {} registered, {} preloaded, {} active",
        report.registered,
        report.preloaded,
        report.activated.len()
    );
    for id in &report.activated {
        println!("      • {id}");
    }
    println!();

    match duration {
        Some(secs) => {
            println!("Running for {secs}s...");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            println!("Press Ctrl-C to stop.");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
        }
    }

    info!("shutting down");
    reloads.abort();
    runtime.shutdown().await;

    let metrics = runtime.metrics().generate_report();
    if json {
        println!("{}", report_json(&metrics)?);
    } else {
        print_report(&metrics);
    }
    Ok(())
}

/// Feed every config the loader accepts into the running runtime.
async fn apply_reloads(runtime: Arc<Runtime>, config_loader: ConfigLoader) {
    let mut updates = config_loader.subscribe();
    while updates.changed().await.is_ok() {
        let config = updates.borrow_and_update().clone();
        let report = runtime.apply_config(config).await;
        for id in &report.added {
            println!("   ➕ {id} registered");
        }
    }
}

fn report_json(report: &MetricsReport) -> hive_core::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn print_report(report: &MetricsReport) {
    let current = &report.current;
    println!();
    println!("\x1b[1mRuntime metrics\x1b[0m");
    println!("{}", "-".repeat(40));
    println!("   uptime            {}s", report.system.uptime_secs);
    println!("   messages          {}", current.messages_processed);
    println!("   thoughts          {}", current.thoughts_processed);
    println!("   decisions         {}", current.decisions_made);
    println!("   actions           {}", current.actions_executed);
    println!("   memories stored   {}", current.memories_stored);
    println!(
        "   response time     {:.2}ms avg / {:.2}ms peak",
        report.performance.average_response_time_ms, report.performance.peak_response_time_ms
    );
    println!(
        "   throughput        {:.1} ops/min",
        report.performance.operations_per_minute
    );
    if report.system.memory_usage_bytes > 0 {
        println!(
            "   memory            {:.1} MiB",
            report.system.memory_usage_bytes as f64 / (1024.0 * 1024.0)
        );
    }
}
