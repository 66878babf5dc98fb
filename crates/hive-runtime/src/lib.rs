//! # hive-runtime
//!
//! The orchestration layer — agent lifecycle, per-agent autonomous loops,
//! context enrichment, and runtime telemetry.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  TickDriver  │  ← every tick: one process_agent_tick per agent
//!                 └──────┬───────┘
//!                        │
//!                        ▼
//!   ┌────────────────────────────────────────┐
//!   │             AgentManager               │
//!   │                                        │
//!   │  active ◄── activate ── lazy           │
//!   │  registry ── deactivate ──► registry   │
//!   └───────────────────┬────────────────────┘
//!                       │ agent.* events
//!                       ▼
//!                 ┌──────────┐
//!                 │ EventBus │
//!                 └────┬─────┘
//!                      ▼
//!   ┌────────────────────────────────────────┐
//!   │        IntegrationCoordinator          │
//!   │                                        │
//!   │  Autonomous + Decision engine per agent│
//!   │  Context system (L1 → L2 → compute)    │
//!   │  Runtime tools                         │
//!   └────────────────────────────────────────┘
//!
//!          RuntimeMetricsCollector  ← counters/timers from every layer
//! ```

pub mod autonomous;
pub mod context;
pub mod decision;
pub mod heartbeat;
pub mod integration;
pub mod manager;
pub mod metrics;
pub mod mock;
pub mod runtime;
pub mod tick;

pub use autonomous::AutonomousEngine;
pub use context::{
    BootstrapOutcome, ContextBootstrapper, ContextManager, ContextService, ContextStats,
    EnrichmentRequest, InMemoryContextBootstrapper, ThoughtContext, TieredContextManager,
};
pub use decision::DecisionEngine;
pub use heartbeat::{HeartbeatAgent, HeartbeatFactory};
pub use integration::{AutonomousStatus, IntegrationCoordinator};
pub use manager::{AgentManager, AgentManagerSummary};
pub use metrics::{
    MetricsReport, PerformanceStats, PerformanceTimer, RuntimeMetrics, RuntimeMetricsCollector,
    SystemStats,
};
pub use mock::{MockAgent, MockFactory};
pub use runtime::{ReloadReport, Runtime, RuntimeBuilder, StartupReport};
pub use tick::{TickDriver, TickRound};
