//! # hive-core
//!
//! Core types, traits, and primitives for the Hive multi-agent runtime.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the agent collaborator contracts, the lifecycle event bus, and the unified error type.

pub mod agent;
pub mod character;
pub mod error;
pub mod event;
pub mod tool;
pub mod types;

pub use agent::{
    ActionCandidate, Agent, AgentFactory, Decision, EmotionSnapshot, ExtensionInfo, MemoryRecord,
    MetricsSink,
};
pub use character::{AgentConfig, AutonomousSettings, CharacterConfig, ModuleConfig};
pub use error::{HiveError, Result};
pub use event::{Event, EventBus, EventKind};
pub use tool::{Tool, ToolRegistry};
pub use types::*;
