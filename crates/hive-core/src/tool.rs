use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a tool the runtime exposes to extensions and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name, e.g. "runtime.autonomous_status".
    pub name: String,
    /// Human-readable description for the model.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
    /// Whether this tool has side-effects (write vs read).
    #[serde(default)]
    pub is_mutating: bool,
    /// Which subsystem provides this tool (None = built-in).
    #[serde(default)]
    pub provider: Option<String>,
}

/// The module registry hook extensions use to discover runtime tools.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn register_tool(&self, id: &str, tool: Tool) -> crate::Result<()>;
}
