use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::AgentId;

/// Declarative description of an agent's character — what it is made of.
///
/// Character files are parsed elsewhere; this is the shape the runtime consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub id: AgentId,
    pub name: String,
    /// Start this agent automatically and rank it first for activation.
    #[serde(rename = "default")]
    pub is_default: bool,
    pub autonomous: AutonomousSettings,
    pub extensions: Vec<ModuleConfig>,
    pub memory: Option<ModuleConfig>,
    pub emotion: Option<ModuleConfig>,
    pub cognition: Option<ModuleConfig>,
    pub portal: Option<ModuleConfig>,
    /// Free-form personality description (traits, backstory, tone).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub personality: Value,
}

impl CharacterConfig {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Personality traits, if the personality block carries a `traits` array.
    pub fn traits(&self) -> Vec<String> {
        self.personality
            .get("traits")
            .and_then(Value::as_array)
            .map(|traits| {
                traits
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Autonomous-behaviour settings of a character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomousSettings {
    pub enabled: bool,
    /// Interval between autonomous cycles. `None` falls back to the runtime default.
    pub interval_ms: Option<u64>,
}

/// A pluggable module reference: a provider name plus provider-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub provider: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: HashMap<String, Value>,
}

impl ModuleConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            enabled: true,
            settings: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// The materialization request handed to an [`AgentFactory`](crate::AgentFactory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub name: String,
    pub memory: Option<ModuleConfig>,
    pub emotion: Option<ModuleConfig>,
    pub cognition: Option<ModuleConfig>,
    pub portal: Option<ModuleConfig>,
    /// Enabled extensions only.
    pub extensions: Vec<ModuleConfig>,
    pub autonomous: AutonomousSettings,
    /// The character this config was built from.
    pub character: CharacterConfig,
}

impl AgentConfig {
    pub fn from_character(character: &CharacterConfig) -> Self {
        Self {
            id: character.id.clone(),
            name: character.name.clone(),
            memory: character.memory.clone(),
            emotion: character.emotion.clone(),
            cognition: character.cognition.clone(),
            portal: character.portal.clone(),
            extensions: character
                .extensions
                .iter()
                .filter(|e| e.enabled)
                .cloned()
                .collect(),
            autonomous: character.autonomous.clone(),
            character: character.clone(),
        }
    }
}
