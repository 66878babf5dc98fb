//! # hive-cli
//!
//! Command-line interface for the Hive multi-agent runtime.
//!
//! ## Commands
//!
//! - `hive start` — Run the runtime until Ctrl-C, then print the metrics report
//! - `hive status` — Show the lazy registry the config would produce
//! - `hive config` — Show the effective configuration
//! - `hive priority` — Rank configured characters by activation priority

pub mod commands;

pub use commands::Cli;
