//! Command-line interface parsing for jobfeed
//!
//! This module handles parsing of CLI arguments using clap and merging them
//! over the configuration file.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{Config, ConfigError};

/// Error types for CLI handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `--interval-secs 0` would run back to back
    #[error("Invalid interval: must be at least 1 second")]
    InvalidInterval,
}

/// jobfeed - Aggregate job listings into enriched, cached records
#[derive(Parser, Debug)]
#[command(name = "jobfeed")]
#[command(about = "Fetches, caches and enriches job listings, printing them as JSON")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, value_name = "PATH", env = "JOBFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listings API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Override the number of records produced per run
    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,

    /// Keep the cache in memory instead of on disk
    #[arg(long)]
    pub memory_cache: bool,

    /// Override the on-disk cache directory
    #[arg(long, value_name = "DIR", conflicts_with = "memory_cache")]
    pub cache_dir: Option<PathBuf>,

    /// Check that the cache store works, then exit
    #[arg(long, conflicts_with = "clear_cache")]
    pub health_check: bool,

    /// Remove every cached entry for the configured environment, then exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Keep running, aggregating every N seconds
    ///
    /// Examples:
    ///   jobfeed --interval-secs 300     # Refresh every 5 minutes
    #[arg(long, value_name = "SECONDS")]
    pub interval_secs: Option<u64>,
}

/// What the binary should do after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Aggregate once and print
    Once,
    /// Aggregate on an interval, printing each successful run
    Watch { interval_secs: u64 },
    HealthCheck,
    ClearCache,
}

/// Configuration derived from the config file and CLI arguments
#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    pub config: Config,
    pub mode: Mode,
    pub memory_cache: bool,
}

impl StartupConfig {
    /// Loads the configuration file (if any) and applies CLI overrides.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with the merged, validated configuration
    /// * `Err(CliError)` if the file is unreadable or a value is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::load(cli.config.as_deref())?;

        if let Some(base_url) = &cli.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(max_records) = cli.max_records {
            config.max_records = max_records;
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        config.validate()?;

        let mode = if cli.health_check {
            Mode::HealthCheck
        } else if cli.clear_cache {
            Mode::ClearCache
        } else {
            match cli.interval_secs {
                Some(0) => return Err(CliError::InvalidInterval),
                Some(interval_secs) => Mode::Watch { interval_secs },
                None => Mode::Once,
            }
        };

        Ok(StartupConfig {
            config,
            mode,
            memory_cache: cli.memory_cache,
        })
    }
}
