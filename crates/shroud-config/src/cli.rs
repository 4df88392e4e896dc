//! Command-line argument parsing for the admin binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Config;

/// Shroud admin command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "shroud", about = "Progressive disclosure engine")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Disclosure radius in blocks.
    #[arg(long, global = true)]
    pub radius: Option<f64>,

    /// Blocks hidden or revealed per tick.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Admin subcommands. None of them touch live session state.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print protected type count and current flags.
    Status,
    /// Print the version.
    Version,
    /// Re-read config.ron and report what changed.
    Reload,
    /// Run a short scripted session against an in-memory world.
    Demo,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(radius) = args.radius {
            self.protection.visibility_radius = radius;
        }
        if let Some(batch) = args.batch_size {
            self.protection.blocks_per_tick = batch;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            config: None,
            log_level: Some("debug".to_string()),
            radius: Some(24.0),
            batch_size: None,
            command: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.debug.log_level, "debug");
        assert_eq!(config.protection.visibility_radius, 24.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.protection.blocks_per_tick, 50);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        let args = CliArgs {
            config: None,
            log_level: None,
            radius: None,
            batch_size: None,
            command: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_subcommand_with_global_flags() {
        let args = CliArgs::parse_from(["shroud", "status", "--radius", "8", "--batch-size", "10"]);
        assert_eq!(args.command, Some(Command::Status));
        assert_eq!(args.radius, Some(8.0));
        assert_eq!(args.batch_size, Some(10));
    }
}
