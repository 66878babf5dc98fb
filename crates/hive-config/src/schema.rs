use hive_core::CharacterConfig;
use serde::{Deserialize, Serialize};

/// Root configuration — maps to `hive.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub runtime: RuntimeConfig,
    pub lazy: LazyConfig,
    pub autonomy: AutonomyConfig,
    pub context: ContextConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    /// Characters known to the runtime. Each one is registered as a lazy agent.
    pub characters: Vec<CharacterConfig>,
}

// ── Runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval between scheduling cycles.
    pub tick_interval_ms: u64,
    /// Capacity of the lifecycle event bus.
    pub event_bus_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            event_bus_capacity: 4096,
        }
    }
}

// ── Lazy loading ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyConfig {
    /// Unload idle lazy agents automatically.
    pub auto_unload: bool,
    /// Idle time after which a lazy agent is deactivated.
    pub max_inactive_ms: u64,
    /// How often the unload sweep runs.
    pub unload_check_interval_ms: u64,
    /// Number of highest-priority agents to preload at startup.
    pub preload_count: usize,
}

impl Default for LazyConfig {
    fn default() -> Self {
        Self {
            auto_unload: true,
            max_inactive_ms: 30 * 60 * 1_000,
            unload_check_interval_ms: 5 * 60 * 1_000,
            preload_count: 0,
        }
    }
}

// ── Autonomy ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Start autonomous systems for characters with `autonomous.enabled`.
    pub enabled: bool,
    /// Cycle interval for characters that don't set their own.
    pub default_interval_ms: u64,
    /// Candidates scoring below this are never selected.
    pub min_decision_score: f64,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_interval_ms: 30_000,
            min_decision_score: 0.0,
        }
    }
}

// ── Context ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Bootstrap the built-in tiered context system.
    pub enabled: bool,
    /// How long a per-agent hot (L1) enrichment stays valid.
    pub l1_ttl_ms: u64,
    /// Maximum warm (L2) entries across all agents.
    pub l2_capacity: usize,
    /// Maximum enrichment depth requested per context.
    pub max_depth: u8,
    /// Recent memories pulled into each base context.
    pub recent_memory_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            l1_ttl_ms: 5_000,
            l2_capacity: 256,
            max_depth: 3,
            recent_memory_limit: 10,
        }
    }
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Periodic collection interval. 0 disables the timer (start still collects once).
    pub collection_interval_ms: u64,
    /// Bounded history ring size.
    pub max_history_entries: usize,
    /// Sample process memory/CPU on each collection.
    pub sample_system_resources: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_ms: 60_000,
            max_history_entries: 100,
            sample_system_resources: true,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl HiveConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Tick interval ───
        if self.runtime.tick_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.tick_interval_ms".into(),
                message: "tick interval is 0 — the scheduler would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1000".into()),
            });
        } else if self.runtime.tick_interval_ms < 50 {
            warnings.push(ConfigWarning {
                field: "runtime.tick_interval_ms".into(),
                message: format!("tick interval {}ms is very short", self.runtime.tick_interval_ms),
                severity: WarningSeverity::Warning,
                hint: Some("Intervals under 50ms mostly burn CPU".into()),
            });
        }

        if self.runtime.event_bus_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.event_bus_capacity".into(),
                message: "event bus capacity must be positive".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Lazy loading ───
        if self.lazy.auto_unload && self.lazy.unload_check_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "lazy.unload_check_interval_ms".into(),
                message: "auto_unload is on but the sweep interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set an interval or disable lazy.auto_unload".into()),
            });
        }
        if self.lazy.preload_count > self.characters.len() && !self.characters.is_empty() {
            warnings.push(ConfigWarning {
                field: "lazy.preload_count".into(),
                message: format!(
                    "preload_count {} exceeds the {} configured characters",
                    self.lazy.preload_count,
                    self.characters.len()
                ),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Autonomy ───
        if self.autonomy.default_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "autonomy.default_interval_ms".into(),
                message: "autonomous interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30000".into()),
            });
        }

        // ── Context ───
        if self.context.max_depth == 0 || self.context.max_depth > 5 {
            warnings.push(ConfigWarning {
                field: "context.max_depth".into(),
                message: format!("depth {} is out of range", self.context.max_depth),
                severity: WarningSeverity::Warning,
                hint: Some("Depth must be between 1 and 5; 3 is typical".into()),
            });
        }

        // ── Metrics ───
        if self.metrics.enabled && self.metrics.max_history_entries == 0 {
            warnings.push(ConfigWarning {
                field: "metrics.max_history_entries".into(),
                message: "history size is 0 — reports will carry no history".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 100".into()),
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }
        if self.logging.format != "pretty" && self.logging.format != "json" {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some("Use 'pretty' or 'json'".into()),
            });
        }

        // ── Characters ───
        let mut seen = std::collections::HashSet::new();
        for (i, character) in self.characters.iter().enumerate() {
            if character.id.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("characters[{i}].id"),
                    message: "character id is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            } else if !seen.insert(character.id.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("characters[{i}].id"),
                    message: format!("duplicate character id '{}'", character.id),
                    severity: WarningSeverity::Error,
                    hint: Some("Character ids must be unique".into()),
                });
            }
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
