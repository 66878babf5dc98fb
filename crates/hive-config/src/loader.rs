use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use hive_core::HiveError;

use crate::schema::HiveConfig;

/// Loads and optionally hot-reloads the Hive configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<HiveConfig>>,
    updates: Arc<watch::Sender<HiveConfig>>,
    config_path: PathBuf,
}

/// Store an accepted config and notify subscribers.
fn publish(
    config: &RwLock<HiveConfig>,
    updates: &watch::Sender<HiveConfig>,
    new_config: HiveConfig,
) {
    *config.write() = new_config.clone();
    updates.send_replace(new_config);
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > HIVE_CONFIG env > ~/.hive/hive.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("HIVE_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hive")
            .join("hive.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> hive_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            HiveConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(HiveError::Config(e));
            }
        }

        let (updates, _) = watch::channel(config.clone());
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            updates: Arc::new(updates),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> HiveConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<HiveConfig>> {
        Arc::clone(&self.config)
    }

    /// Receive every config accepted by [`reload`](Self::reload) or the file
    /// watcher. The current config is marked as already seen.
    pub fn subscribe(&self) -> watch::Receiver<HiveConfig> {
        self.updates.subscribe()
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> hive_core::Result<HiveConfig> {
        toml::from_str::<HiveConfig>(raw).map_err(|e| {
            HiveError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides (HIVE_TICK_INTERVAL_MS, HIVE_LOG_LEVEL, etc.)
    fn apply_env_overrides(config: HiveConfig) -> HiveConfig {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are ignored.
    pub fn apply_overrides_from(
        mut config: HiveConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HiveConfig {
        if let Some(v) = lookup("HIVE_TICK_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.runtime.tick_interval_ms = ms;
            }
        }
        if let Some(v) = lookup("HIVE_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("HIVE_METRICS_ENABLED") {
            if let Ok(enabled) = v.parse::<bool>() {
                config.metrics.enabled = enabled;
            }
        }
        if let Some(v) = lookup("HIVE_MAX_INACTIVE_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.lazy.max_inactive_ms = ms;
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> hive_core::Result<()> {
        if !self.config_path.exists() {
            return Err(HiveError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = Self::apply_env_overrides(Self::parse(&raw, &self.config_path)?);
        new_config.validate().map_err(HiveError::Config)?;
        publish(&self.config, &self.updates, new_config);
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads when the config file changes.
    /// Returns the watcher, which must be kept alive for watching to continue.
    pub fn watch(&self) -> hive_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let updates = Arc::clone(&self.updates);
        let path_for_event = self.config_path.clone();

        info!(config_path = ?self.config_path, "starting config file watcher");

        let mut watcher = notify::recommended_watcher(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    let parsed = std::fs::read_to_string(&path_for_event)
                        .map_err(HiveError::from)
                        .and_then(|raw| ConfigLoader::parse(&raw, &path_for_event))
                        .map(ConfigLoader::apply_env_overrides);
                    match parsed {
                        Ok(new_config) => match new_config.validate() {
                            Ok(_) => {
                                publish(&config, &updates, new_config);
                                info!("configuration hot-reloaded successfully");
                            }
                            Err(e) => warn!(error = %e, "new config is invalid, keeping current config"),
                        },
                        Err(e) => warn!(error = %e, "config file has errors, keeping current config"),
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            },
        )
        .map_err(|e| HiveError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| HiveError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
