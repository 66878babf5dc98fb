use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hive_config::ConfigLoader;

mod registry;
mod start;

/// 🐝 Hive — multi-agent orchestration runtime
#[derive(Parser)]
#[command(name = "hive", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to hive.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime and run until Ctrl-C
    Start {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,
        /// Print the final metrics report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the lazy agent registry built from the configured characters
    Status,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rank configured characters by activation priority
    Priority,
}

impl Cli {
    pub async fn run(self) -> hive_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config; RUST_LOG beats all of them
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Start { duration, json } => {
                start::cmd_start(config, config_loader, duration, json).await
            }
            Commands::Status => registry::cmd_status(config),
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Priority => registry::cmd_priority(config),
        }
    }

    fn cmd_config(config: hive_config::HiveConfig, json: bool) -> hive_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| hive_core::HiveError::Config(e.to_string()))?
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_globals() {
        let cli = Cli::try_parse_from([
            "hive", "start", "--duration", "5", "--json", "-c", "hive.toml", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("hive.toml")));
        assert!(matches!(
            cli.command,
            Commands::Start {
                duration: Some(5),
                json: true
            }
        ));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["hive", "-v", "-q", "status"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["hive"]).is_err());
    }

    #[test]
    fn test_parse_config_json() {
        let cli = Cli::try_parse_from(["hive", "config", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { json: true }));
    }
}
