use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::character::CharacterConfig;

/// Unique identifier for an agent.
pub type AgentId = String;

/// Unique identifier for a registered tool.
pub type ToolId = String;

/// Runtime status of a materialized agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Idle,
    Thinking,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a lazy (dormant) agent descriptor.
///
/// ```text
/// Inactive ──► Preloading ──► Preloaded
///    │                            │
///    └────────► Activating ◄──────┘
///                   │
///                   ▼
///                Active ──(deactivate)──► Inactive
///
/// Preloading / Activating ──(failure)──► Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LazyAgentStatus {
    Inactive,
    Preloading,
    Preloaded,
    Activating,
    Active,
    Error,
}

impl LazyAgentStatus {
    /// Whether `self -> next` is a legal transition of the lazy lifecycle.
    pub fn can_transition_to(self, next: LazyAgentStatus) -> bool {
        use LazyAgentStatus::*;
        matches!(
            (self, next),
            (Inactive, Preloading)
                | (Preloading, Preloaded)
                | (Inactive, Activating)
                | (Preloaded, Activating)
                | (Activating, Active)
                | (Active, Inactive)
                | (Activating, Error)
                | (Preloading, Error)
        )
    }

    /// Preloaded, activating, or active — the warm-up work is already done or underway.
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Preloaded | Self::Activating | Self::Active)
    }
}

impl fmt::Display for LazyAgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Preloading => "preloading",
            Self::Preloaded => "preloaded",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lightweight descriptor for an agent that is not necessarily materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyAgent {
    pub id: AgentId,
    pub character: CharacterConfig,
    pub status: LazyAgentStatus,
    /// Ranking score used for activation / preload ordering.
    pub priority: u32,
    pub last_activated: Option<DateTime<Utc>>,
    pub activation_count: u64,
}

impl LazyAgent {
    pub fn new(character: CharacterConfig, priority: u32) -> Self {
        Self {
            id: character.id.clone(),
            character,
            status: LazyAgentStatus::Inactive,
            priority,
            last_activated: None,
            activation_count: 0,
        }
    }
}
