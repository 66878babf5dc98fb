//! # hive-config
//!
//! Configuration system for the Hive runtime. Reads from `hive.toml` and environment
//! variables, in that precedence order, and supports hot-reload via a filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::HiveConfig;
pub use schema::{
    AutonomyConfig, ConfigWarning, ContextConfig, LazyConfig, LoggingConfig, MetricsConfig,
    RuntimeConfig, WarningSeverity,
};
