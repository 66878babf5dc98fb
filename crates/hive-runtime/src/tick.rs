//! The scheduling loop.
//!
//! Every tick the driver snapshots the active registry and spawns one
//! `process_agent_tick` per agent without waiting on any of them, so a slow
//! agent never delays the others. An agent whose previous tick is still in
//! flight is skipped for that round. A second, slower interval runs the idle
//! unload sweep.

use dashmap::DashSet;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hive_config::{LazyConfig, RuntimeConfig};
use hive_core::AgentId;

use crate::manager::AgentManager;
use crate::metrics::RuntimeMetricsCollector;

/// Ticks spawned by one call to [`TickDriver::tick_all`].
pub struct TickRound {
    pub scheduled: usize,
    /// Agents skipped because their previous tick had not finished.
    pub skipped: usize,
    handles: Vec<JoinHandle<bool>>,
}

impl TickRound {
    /// Wait for every tick of this round. Returns how many succeeded.
    pub async fn join(self) -> usize {
        futures::future::join_all(self.handles)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count()
    }
}

/// Interval settings, replaceable while the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    tick_interval: Duration,
    auto_unload: bool,
    unload_interval: Duration,
    max_inactive: Duration,
}

impl Schedule {
    fn from_config(runtime: &RuntimeConfig, lazy: &LazyConfig) -> Self {
        // Zero intervals are rejected by config validation; clamp anyway so
        // `tokio::time::interval` never sees one.
        let floor = Duration::from_millis(1);
        Self {
            tick_interval: Duration::from_millis(runtime.tick_interval_ms).max(floor),
            auto_unload: lazy.auto_unload,
            unload_interval: Duration::from_millis(lazy.unload_check_interval_ms).max(floor),
            max_inactive: Duration::from_millis(lazy.max_inactive_ms),
        }
    }
}

pub struct TickDriver {
    manager: Arc<AgentManager>,
    metrics: Option<Arc<RuntimeMetricsCollector>>,
    schedule: RwLock<Schedule>,
    rescheduled: Notify,
    in_flight: Arc<DashSet<AgentId>>,
    cancel: CancellationToken,
    rounds: AtomicU64,
    timer_seq: Arc<AtomicU64>,
    unloaded_total: AtomicU64,
}

impl TickDriver {
    pub fn new(manager: Arc<AgentManager>, runtime: &RuntimeConfig, lazy: &LazyConfig) -> Self {
        Self {
            manager,
            metrics: None,
            schedule: RwLock::new(Schedule::from_config(runtime, lazy)),
            rescheduled: Notify::new(),
            in_flight: Arc::new(DashSet::new()),
            cancel: CancellationToken::new(),
            rounds: AtomicU64::new(0),
            timer_seq: Arc::new(AtomicU64::new(0)),
            unloaded_total: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RuntimeMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn one tick per active agent.
    pub fn tick_all(&self) -> TickRound {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        let mut round = TickRound {
            scheduled: 0,
            skipped: 0,
            handles: Vec::new(),
        };

        for agent in self.manager.get_agents() {
            let agent_id = agent.id().to_string();
            if !self.in_flight.insert(agent_id.clone()) {
                debug!(agent_id = %agent_id, "previous tick still running, skipping");
                round.skipped += 1;
                continue;
            }

            let manager = Arc::clone(&self.manager);
            let metrics = self.metrics.clone();
            let in_flight = Arc::clone(&self.in_flight);
            let timer_id = format!(
                "tick:{agent_id}:{}",
                self.timer_seq.fetch_add(1, Ordering::Relaxed)
            );

            round.handles.push(tokio::spawn(async move {
                if let Some(ref m) = metrics {
                    m.start_timer(timer_id.as_str(), "agent.tick", Some(agent_id.as_str()));
                }
                let ok = manager.process_agent_tick(&agent).await;
                if let Some(ref m) = metrics {
                    m.end_timer(&timer_id);
                }
                in_flight.remove(&agent_id);
                ok
            }));
            round.scheduled += 1;
        }

        round
    }

    /// Swap in new intervals. A running loop picks them up immediately.
    pub fn reconfigure(&self, runtime: &RuntimeConfig, lazy: &LazyConfig) -> bool {
        let next = Schedule::from_config(runtime, lazy);
        {
            let mut schedule = self.schedule.write();
            if *schedule == next {
                return false;
            }
            *schedule = next;
        }
        info!(
            tick_ms = next.tick_interval.as_millis() as u64,
            auto_unload = next.auto_unload,
            "tick driver rescheduled"
        );
        self.rescheduled.notify_one();
        true
    }

    pub fn tick_interval(&self) -> Duration {
        self.schedule.read().tick_interval
    }

    /// Run until [`stop`](Self::stop) is called.
    pub async fn run(self: Arc<Self>) {
        'schedule: loop {
            let schedule = *self.schedule.read();
            let mut ticks = tokio::time::interval(schedule.tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweeps = tokio::time::interval_at(
                tokio::time::Instant::now() + schedule.unload_interval,
                schedule.unload_interval,
            );
            sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                tick_ms = schedule.tick_interval.as_millis() as u64,
                auto_unload = schedule.auto_unload,
                "tick driver started"
            );

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'schedule,
                    _ = self.rescheduled.notified() => continue 'schedule,
                    _ = ticks.tick() => {
                        self.tick_all();
                    }
                    _ = sweeps.tick(), if schedule.auto_unload => {
                        let unloaded = self.manager.unload_inactive_agents(schedule.max_inactive).await;
                        self.unloaded_total.fetch_add(unloaded as u64, Ordering::Relaxed);
                    }
                }
            }
        }

        if !self.in_flight.is_empty() {
            warn!(in_flight = self.in_flight.len(), "tick driver stopped with ticks in flight");
        }
        info!(rounds = self.rounds(), "tick driver stopped");
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub fn unloaded_total(&self) -> u64 {
        self.unloaded_total.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
