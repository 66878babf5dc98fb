#[cfg(test)]
mod tests {
    use hive_config::ConfigLoader;
    use hive_config::schema::*;
    use std::collections::HashMap;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_hive_config_defaults() {
        let config = HiveConfig::default();
        assert_eq!(config.runtime.tick_interval_ms, 1_000);
        assert_eq!(config.runtime.event_bus_capacity, 4096);
        assert!(config.characters.is_empty());
    }

    #[test]
    fn test_lazy_config_defaults() {
        let config = LazyConfig::default();
        assert!(config.auto_unload);
        assert_eq!(config.max_inactive_ms, 1_800_000);
        assert_eq!(config.unload_check_interval_ms, 300_000);
        assert_eq!(config.preload_count, 0);
    }

    #[test]
    fn test_metrics_and_context_defaults() {
        let metrics = MetricsConfig::default();
        assert!(metrics.enabled);
        assert_eq!(metrics.max_history_entries, 100);
        let context = ContextConfig::default();
        assert_eq!(context.max_depth, 3);
        assert!(context.enabled);
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = HiveConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = HiveConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: HiveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.runtime.tick_interval_ms, config.runtime.tick_interval_ms);
        assert_eq!(restored.lazy.max_inactive_ms, config.lazy.max_inactive_ms);
    }

    #[test]
    fn test_partial_toml_with_characters() {
        let toml_str = r#"
[runtime]
tick_interval_ms = 250

[[characters]]
id = "nyx"
name = "Nyx"
default = true

[characters.autonomous]
enabled = true
interval_ms = 10000

[characters.memory]
provider = "sqlite"
path = "nyx.db"

[[characters.extensions]]
provider = "discord"

[[characters]]
id = "aria"
name = "Aria"
"#;
        let config: HiveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runtime.tick_interval_ms, 250);
        assert_eq!(config.characters.len(), 2);
        let nyx = &config.characters[0];
        assert!(nyx.is_default);
        assert!(nyx.autonomous.enabled);
        assert_eq!(nyx.memory.as_ref().unwrap().settings["path"], "nyx.db");
        assert_eq!(nyx.extensions[0].provider, "discord");
        assert!(!config.characters[1].is_default);
        // Defaults should fill in
        assert_eq!(config.metrics.max_history_entries, 100);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_zero_tick_interval_is_an_error() {
        let mut config = HiveConfig::default();
        config.runtime.tick_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("runtime.tick_interval_ms"));
    }

    #[test]
    fn test_duplicate_character_ids_are_rejected() {
        let mut config = HiveConfig::default();
        config.characters = vec![
            hive_core::CharacterConfig::new("nyx", "Nyx"),
            hive_core::CharacterConfig::new("nyx", "Nyx again"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.contains("duplicate character id"));
    }

    #[test]
    fn test_unknown_log_format_is_a_warning() {
        let mut config = HiveConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
        assert!(warnings[0].to_string().contains("logging.format"));
    }

    // ── Override tests ─────────────────────────────────────────

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HIVE_TICK_INTERVAL_MS", "200"),
            ("HIVE_LOG_LEVEL", "debug"),
            ("HIVE_METRICS_ENABLED", "not-a-bool"),
            ("HIVE_MAX_INACTIVE_MS", "60000"),
        ]);
        let config = ConfigLoader::apply_overrides_from(HiveConfig::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });
        assert_eq!(config.runtime.tick_interval_ms, 200);
        assert_eq!(config.logging.level, "debug");
        assert!(config.metrics.enabled);
        assert_eq!(config.lazy.max_inactive_ms, 60_000);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");
        std::fs::write(
            &config_path,
            r#"
[lazy]
max_inactive_ms = 120000
preload_count = 1

[metrics]
max_history_entries = 10
"#,
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.lazy.preload_count, 1);
        assert_eq!(config.metrics.max_history_entries, 10);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert!(loader.get().characters.is_empty());
    }

    #[test]
    fn test_config_loader_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");
        std::fs::write(&config_path, "[runtime\ntick_interval_ms = ").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");
        std::fs::write(&config_path, "[runtime]\ntick_interval_ms = 500\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().runtime.tick_interval_ms, 500);

        std::fs::write(&config_path, "[runtime]\ntick_interval_ms = 750\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().runtime.tick_interval_ms, 750);

        // An invalid reload keeps the current config
        std::fs::write(&config_path, "[runtime]\ntick_interval_ms = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.shared().read().runtime.tick_interval_ms, 750);
    }

    #[test]
    fn test_subscribers_see_accepted_reloads_only() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");
        std::fs::write(&config_path, "[runtime]\ntick_interval_ms = 500\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let mut updates = loader.subscribe();
        assert!(!updates.has_changed().unwrap());
        assert_eq!(updates.borrow().runtime.tick_interval_ms, 500);

        std::fs::write(
            &config_path,
            "[runtime]\ntick_interval_ms = 250\n\n[[characters]]\nid = \"nyx\"\nname = \"Nyx\"\n",
        )
        .unwrap();
        loader.reload().unwrap();
        assert!(updates.has_changed().unwrap());
        let seen = updates.borrow_and_update().clone();
        assert_eq!(seen.runtime.tick_interval_ms, 250);
        assert_eq!(seen.characters.len(), 1);

        std::fs::write(&config_path, "[runtime]\ntick_interval_ms = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert!(!updates.has_changed().unwrap());
    }
}
