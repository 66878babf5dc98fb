//! Per-agent autonomous loop.
//!
//! Each engine is a tokio task on its own interval. A cycle asks the agent for
//! action candidates, lets the paired [`DecisionEngine`] pick one and hands the
//! decision back. Interrupts preempt an in-flight cycle: the cycle future is
//! dropped and the event is delivered to the agent's `on_event` hook instead.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hive_core::{Agent, AgentId, Event};

use crate::decision::DecisionEngine;
use crate::metrics::RuntimeMetricsCollector;

/// Pending interrupts per engine before new ones are dropped.
const INTERRUPT_QUEUE: usize = 32;

#[derive(Default)]
struct EngineCounters {
    cycles: AtomicU64,
    interrupts: AtomicU64,
}

pub struct AutonomousEngine {
    agent_id: AgentId,
    interval: Duration,
    interrupt_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<EngineCounters>,
}

impl AutonomousEngine {
    /// Start the loop. The first cycle runs one `interval` after spawning.
    pub fn spawn(
        agent: Arc<dyn Agent>,
        decisions: Arc<DecisionEngine>,
        interval: Duration,
        metrics: Option<Arc<RuntimeMetricsCollector>>,
    ) -> Self {
        let agent_id = agent.id().to_string();
        let (interrupt_tx, interrupt_rx) = mpsc::channel(INTERRUPT_QUEUE);
        let cancel = CancellationToken::new();
        let counters = Arc::new(EngineCounters::default());

        let handle = tokio::spawn(run_loop(
            agent,
            decisions,
            interval,
            metrics,
            interrupt_rx,
            cancel.clone(),
            Arc::clone(&counters),
        ));

        info!(agent_id = %agent_id, interval_ms = interval.as_millis() as u64, "autonomous engine started");
        Self {
            agent_id,
            interval,
            interrupt_tx,
            cancel,
            handle: Mutex::new(Some(handle)),
            counters,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queue an external event for the agent. Returns `false` if the engine is
    /// stopped or its queue is full.
    pub fn interrupt(&self, event: Event) -> bool {
        match self.interrupt_tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(agent_id = %self.agent_id, event = %event.kind, "interrupt queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(agent_id = %self.agent_id, "interrupt for stopped engine");
                false
            }
        }
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(agent_id = %self.agent_id, error = %e, "autonomous engine task ended abnormally");
            }
            info!(agent_id = %self.agent_id, "autonomous engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .handle
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cycles_completed(&self) -> u64 {
        self.counters.cycles.load(Ordering::Relaxed)
    }

    pub fn interrupts_handled(&self) -> u64 {
        self.counters.interrupts.load(Ordering::Relaxed)
    }
}

impl Drop for AutonomousEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    agent: Arc<dyn Agent>,
    decisions: Arc<DecisionEngine>,
    interval: Duration,
    metrics: Option<Arc<RuntimeMetricsCollector>>,
    mut interrupts: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    counters: Arc<EngineCounters>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(event) = interrupts.recv() => {
                deliver(&agent, &event, &counters, metrics.as_deref()).await;
            }
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(event) = interrupts.recv() => {
                        debug!(agent_id = %agent.id(), event = %event.kind, "autonomous cycle preempted");
                        deliver(&agent, &event, &counters, metrics.as_deref()).await;
                    }
                    _ = run_cycle(&agent, &decisions, metrics.as_deref()) => {
                        counters.cycles.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

async fn run_cycle(
    agent: &Arc<dyn Agent>,
    decisions: &DecisionEngine,
    metrics: Option<&RuntimeMetricsCollector>,
) {
    let candidates = agent.autonomous_candidates().await;
    if let Some(m) = metrics {
        m.record_thought_processed();
    }

    let Some(decision) = decisions.decide(&candidates) else {
        debug!(agent_id = %agent.id(), candidates = candidates.len(), "no action selected");
        return;
    };
    if let Some(m) = metrics {
        m.record_decision_made();
    }

    debug!(agent_id = %agent.id(), action = %decision.action, score = decision.score, "executing decision");
    match agent.execute_decision(&decision).await {
        Ok(()) => {
            if let Some(m) = metrics {
                m.record_action_executed();
            }
        }
        Err(e) => warn!(agent_id = %agent.id(), action = %decision.action, error = %e, "autonomous action failed"),
    }
}

async fn deliver(
    agent: &Arc<dyn Agent>,
    event: &Event,
    counters: &EngineCounters,
    metrics: Option<&RuntimeMetricsCollector>,
) {
    counters.interrupts.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    match agent.on_event(event).await {
        Ok(()) => {
            if let Some(m) = metrics {
                m.record_message_processed(Some(started.elapsed().as_secs_f64() * 1_000.0));
            }
        }
        Err(e) => warn!(agent_id = %agent.id(), event = %event.kind, error = %e, "agent failed to handle interrupt"),
    }
}
