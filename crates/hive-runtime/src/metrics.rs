//! # Runtime Metrics
//!
//! Operational telemetry for the runtime: monotonic counters fed from call
//! sites, a rolling response-time window, named performance timers, process
//! resource gauges and a bounded history of snapshots.
//!
//! The collector only observes. Nothing it does (including sampling failures)
//! influences control flow elsewhere.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hive_config::MetricsConfig;
use hive_core::{AgentId, MetricsSink};

/// Response-time samples kept for the rolling average.
pub const RESPONSE_TIME_WINDOW: usize = 100;

/// Minimum wall-clock time between two summary log lines.
pub const SUMMARY_LOG_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// A point-in-time snapshot of the runtime counters and gauges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    pub messages_processed: u64,
    pub actions_executed: u64,
    pub thoughts_processed: u64,
    pub memories_stored: u64,
    pub emotion_changes: u64,
    pub decisions_made: u64,
    pub plan_steps_executed: u64,
    /// Mean of the most recent response-time samples, in milliseconds.
    pub average_response_time_ms: f64,
    /// Resident memory of this process, in bytes.
    pub memory_usage_bytes: u64,
    pub cpu_usage_percent: f32,
    pub last_update: DateTime<Utc>,
}

/// A named measurement of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceTimer {
    pub id: String,
    pub operation: String,
    pub agent_id: Option<AgentId>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub average_response_time_ms: f64,
    pub peak_response_time_ms: f64,
    /// Messages + actions + thoughts.
    pub total_operations: u64,
    pub operations_per_minute: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub memory_usage_bytes: u64,
    pub uptime_secs: u64,
    /// Timers started but not yet ended.
    pub active_timers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub current: RuntimeMetrics,
    pub history: Vec<RuntimeMetrics>,
    pub performance: PerformanceStats,
    pub system: SystemStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    messages_processed: AtomicU64,
    actions_executed: AtomicU64,
    thoughts_processed: AtomicU64,
    memories_stored: AtomicU64,
    emotion_changes: AtomicU64,
    decisions_made: AtomicU64,
    plan_steps_executed: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        for counter in [
            &self.messages_processed,
            &self.actions_executed,
            &self.thoughts_processed,
            &self.memories_stored,
            &self.emotion_changes,
            &self.decisions_made,
            &self.plan_steps_executed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ResourceGauges {
    memory_usage_bytes: u64,
    cpu_usage_percent: f32,
}

struct ResourceSampler {
    system: System,
    pid: Option<Pid>,
}

impl ResourceSampler {
    fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| debug!(error = %e, "process id unavailable, resource sampling disabled"))
            .ok();
        Self {
            system: System::new(),
            pid,
        }
    }

    fn sample(&mut self) -> Option<ResourceGauges> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self.system.process(pid)?;
        Some(ResourceGauges {
            memory_usage_bytes: process.memory(),
            cpu_usage_percent: process.cpu_usage(),
        })
    }
}

struct Collection {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Whether a summary should be logged now, given when the last one was.
pub fn summary_due(last: Option<Instant>, now: Instant) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= SUMMARY_LOG_INTERVAL,
    }
}

pub struct RuntimeMetricsCollector {
    config: MetricsConfig,
    counters: Counters,
    response_times: Mutex<VecDeque<f64>>,
    timers: Mutex<HashMap<String, (PerformanceTimer, Instant)>>,
    history: Mutex<VecDeque<RuntimeMetrics>>,
    gauges: Mutex<ResourceGauges>,
    sampler: Mutex<ResourceSampler>,
    last_summary: Mutex<Option<Instant>>,
    collection: Mutex<Option<Collection>>,
    started_at: Instant,
}

impl RuntimeMetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            counters: Counters::default(),
            response_times: Mutex::new(VecDeque::with_capacity(RESPONSE_TIME_WINDOW)),
            timers: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            gauges: Mutex::new(ResourceGauges::default()),
            sampler: Mutex::new(ResourceSampler::new()),
            last_summary: Mutex::new(None),
            collection: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Collect once immediately, then periodically if an interval is configured.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            debug!("metrics collection disabled");
            return;
        }
        // Held until the task is stored so concurrent starts spawn one loop.
        let mut slot = self.collection.lock();
        if slot.is_some() {
            return;
        }

        self.collect_metrics();

        if self.config.collection_interval_ms == 0 {
            info!("metrics collected once, periodic collection disabled");
            return;
        }

        let period = Duration::from_millis(self.config.collection_interval_ms);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        collector.collect_metrics();
                    }
                }
            }
        });

        *slot = Some(Collection { cancel, handle });
        drop(slot);
        info!(
            interval_ms = self.config.collection_interval_ms,
            "metrics collection started"
        );
    }

    pub async fn stop(&self) {
        let collection = self.collection.lock().take();
        if let Some(collection) = collection {
            collection.cancel.cancel();
            if let Err(e) = collection.handle.await {
                warn!(error = %e, "metrics collection task ended abnormally");
            }
            info!("metrics collection stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.collection.lock().is_some()
    }

    // ── Recorders ──────────────────────────────────────────────

    pub fn record_message_processed(&self, response_time_ms: Option<f64>) {
        self.counters
            .messages_processed
            .fetch_add(1, Ordering::Relaxed);
        if let Some(ms) = response_time_ms {
            self.push_response_time(ms);
        }
    }

    pub fn record_action_executed(&self) {
        self.counters.actions_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_thought_processed(&self) {
        self.counters
            .thoughts_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_stored(&self) {
        self.counters.memories_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emotion_change(&self) {
        self.counters.emotion_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_made(&self) {
        self.counters.decisions_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_plan_step_executed(&self) {
        self.counters
            .plan_steps_executed
            .fetch_add(1, Ordering::Relaxed);
    }

    fn push_response_time(&self, ms: f64) {
        if !ms.is_finite() || ms < 0.0 {
            debug!(ms, "ignoring invalid response time sample");
            return;
        }
        let mut samples = self.response_times.lock();
        if samples.len() == RESPONSE_TIME_WINDOW {
            samples.pop_front();
        }
        samples.push_back(ms);
    }

    // ── Timers ─────────────────────────────────────────────────

    pub fn start_timer(&self, id: impl Into<String>, operation: impl Into<String>, agent_id: Option<&str>) {
        let id = id.into();
        let timer = PerformanceTimer {
            id: id.clone(),
            operation: operation.into(),
            agent_id: agent_id.map(str::to_string),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
        };
        if self.timers.lock().insert(id.clone(), (timer, Instant::now())).is_some() {
            debug!(timer_id = %id, "timer restarted");
        }
    }

    /// Stop a timer and feed its duration into the response-time window.
    /// Unknown ids log a warning and return `None`.
    pub fn end_timer(&self, id: &str) -> Option<PerformanceTimer> {
        let Some((mut timer, started)) = self.timers.lock().remove(id) else {
            warn!(timer_id = %id, "end_timer called for unknown timer");
            return None;
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        timer.end_time = Some(Utc::now());
        timer.duration_ms = Some(duration_ms);
        self.push_response_time(duration_ms);
        Some(timer)
    }

    pub fn active_timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    // ── Collection ─────────────────────────────────────────────

    fn average_response_time(&self) -> f64 {
        let samples = self.response_times.lock();
        if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        }
    }

    fn peak_response_time(&self) -> f64 {
        self.response_times
            .lock()
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    fn snapshot(&self) -> RuntimeMetrics {
        let c = &self.counters;
        let gauges = *self.gauges.lock();
        RuntimeMetrics {
            messages_processed: c.messages_processed.load(Ordering::Relaxed),
            actions_executed: c.actions_executed.load(Ordering::Relaxed),
            thoughts_processed: c.thoughts_processed.load(Ordering::Relaxed),
            memories_stored: c.memories_stored.load(Ordering::Relaxed),
            emotion_changes: c.emotion_changes.load(Ordering::Relaxed),
            decisions_made: c.decisions_made.load(Ordering::Relaxed),
            plan_steps_executed: c.plan_steps_executed.load(Ordering::Relaxed),
            average_response_time_ms: self.average_response_time(),
            memory_usage_bytes: gauges.memory_usage_bytes,
            cpu_usage_percent: gauges.cpu_usage_percent,
            last_update: Utc::now(),
        }
    }

    /// Snapshot the counters, sample resources, append to history and maybe log a summary.
    pub fn collect_metrics(&self) -> RuntimeMetrics {
        if self.config.sample_system_resources {
            match self.sampler.lock().sample() {
                Some(gauges) => *self.gauges.lock() = gauges,
                None => debug!("process resource sample unavailable"),
            }
        }

        let snapshot = self.snapshot();

        {
            let mut history = self.history.lock();
            history.push_back(snapshot.clone());
            while history.len() > self.config.max_history_entries {
                history.pop_front();
            }
        }

        let now = Instant::now();
        let mut last_summary = self.last_summary.lock();
        if summary_due(*last_summary, now) {
            *last_summary = Some(now);
            info!(
                messages = snapshot.messages_processed,
                actions = snapshot.actions_executed,
                thoughts = snapshot.thoughts_processed,
                decisions = snapshot.decisions_made,
                avg_response_ms = snapshot.average_response_time_ms,
                memory_mb = snapshot.memory_usage_bytes / (1024 * 1024),
                "runtime metrics"
            );
        }

        snapshot
    }

    // ── Queries ────────────────────────────────────────────────

    /// Live snapshot. Does not touch history.
    pub fn get_metrics(&self) -> RuntimeMetrics {
        self.snapshot()
    }

    pub fn get_metrics_history(&self) -> Vec<RuntimeMetrics> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        let c = &self.counters;
        let total_operations = c.messages_processed.load(Ordering::Relaxed)
            + c.actions_executed.load(Ordering::Relaxed)
            + c.thoughts_processed.load(Ordering::Relaxed);
        let minutes = self.uptime().as_secs_f64() / 60.0;
        let operations_per_minute = if minutes > 0.0 {
            total_operations as f64 / minutes
        } else {
            0.0
        };
        PerformanceStats {
            average_response_time_ms: self.average_response_time(),
            peak_response_time_ms: self.peak_response_time(),
            total_operations,
            operations_per_minute,
        }
    }

    pub fn generate_report(&self) -> MetricsReport {
        let current = self.snapshot();
        MetricsReport {
            system: SystemStats {
                memory_usage_bytes: current.memory_usage_bytes,
                uptime_secs: self.uptime().as_secs(),
                active_timers: self.active_timer_count(),
            },
            performance: self.get_performance_stats(),
            history: self.get_metrics_history(),
            current,
            generated_at: Utc::now(),
        }
    }

    /// Zero every counter and drop all samples, timers and history.
    pub fn reset(&self) {
        self.counters.reset();
        self.response_times.lock().clear();
        self.timers.lock().clear();
        self.history.lock().clear();
        *self.gauges.lock() = ResourceGauges::default();
        info!("runtime metrics reset");
    }
}

impl MetricsSink for RuntimeMetricsCollector {
    fn record_message_processed(&self, response_time_ms: Option<f64>) {
        RuntimeMetricsCollector::record_message_processed(self, response_time_ms);
    }

    fn record_memory_stored(&self) {
        RuntimeMetricsCollector::record_memory_stored(self);
    }

    fn record_emotion_change(&self) {
        RuntimeMetricsCollector::record_emotion_change(self);
    }

    fn record_plan_step_executed(&self) {
        RuntimeMetricsCollector::record_plan_step_executed(self);
    }
}
