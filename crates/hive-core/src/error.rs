use thiserror::Error;

/// Unified error type for the entire Hive runtime.
///
/// Programmer errors (`FactoryNotConfigured`, `LazyAgentNotFound`) are returned to the
/// caller and must be fixed at the call site. Operational errors raised by collaborators
/// are usually logged and swallowed at the subsystem boundary instead of surfacing here.
#[derive(Error, Debug)]
pub enum HiveError {
    // ── Lifecycle errors ───────────────────────────────────────
    #[error("agent factory not configured")]
    FactoryNotConfigured,

    #[error("lazy agent not found: {0}")]
    LazyAgentNotFound(String),

    #[error("agent initialization failed: {agent}: {reason}")]
    AgentInitialization { agent: String, reason: String },

    #[error("agent activation failed: {agent}: {reason}")]
    Activation { agent: String, reason: String },

    #[error("agent error: {0}")]
    Agent(String),

    // ── Subsystem errors ───────────────────────────────────────
    #[error("context system error: {0}")]
    Context(String),

    #[error("tool registration failed: {tool}: {reason}")]
    Tool { tool: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HiveError {
    /// Whether this error signals a broken call site rather than a runtime condition.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Self::FactoryNotConfigured | Self::LazyAgentNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, HiveError>;
