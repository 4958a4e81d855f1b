//! Configuration loading for jobfeed
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Values are checked by `validate` before use.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::AggregateOptions;
use crate::cache::{kinds, TtlPolicy};
use crate::upstream::{BatchOptions, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the listings API, e.g. `https://jobs.example.com/api`
    pub base_url: String,
    /// Namespace prefixed to every cache key
    pub environment: String,
    /// Records produced per run
    pub max_records: usize,
    pub upstream: UpstreamConfig,
    pub enrichment: EnrichmentConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub detail_concurrency: usize,
    pub window_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL per cache kind
    pub ttl_seconds: HashMap<String, u64>,
    pub default_ttl_seconds: u64,
    pub stale_grace_seconds: u64,
    /// Directory for the on-disk store; the XDG cache dir when unset
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            environment: "dev".to_string(),
            max_records: 20,
            upstream: UpstreamConfig::default(),
            enrichment: EnrichmentConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let batch = BatchOptions::default();
        Self {
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            request_timeout_ms: retry.request_timeout.as_millis() as u64,
            detail_concurrency: batch.concurrency,
            window_delay_ms: batch.window_delay.as_millis() as u64,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let options = AggregateOptions::default();
        Self {
            batch_size: options.batch_size,
            batch_delay_ms: options.batch_delay.as_millis() as u64,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let policy = TtlPolicy::default();
        Self {
            ttl_seconds: policy.by_kind,
            default_ttl_seconds: policy.default_ttl_seconds,
            stale_grace_seconds: policy.stale_grace_seconds,
            dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl Config {
    /// Loads and validates the file at `path`, or the defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url", "must not be empty"));
        }
        if self.environment.trim().is_empty() {
            return Err(invalid("environment", "must not be empty"));
        }
        if self.environment.contains(|c| c == '_' || c == ':') {
            return Err(invalid("environment", "must not contain '_' or ':'"));
        }
        if self.upstream.request_timeout_ms == 0 {
            return Err(invalid("upstream.request_timeout_ms", "must be greater than zero"));
        }
        if self.upstream.detail_concurrency == 0 {
            return Err(invalid("upstream.detail_concurrency", "must be greater than zero"));
        }
        if self.enrichment.batch_size == 0 {
            return Err(invalid("enrichment.batch_size", "must be greater than zero"));
        }
        for kind in [kinds::LISTINGS, kinds::DETAILS] {
            if self.cache.ttl_seconds.get(kind) == Some(&0) {
                return Err(invalid(
                    "cache.ttl_seconds",
                    &format!("{} TTL must be greater than zero", kind),
                ));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.upstream.max_retries,
            base_delay: Duration::from_millis(self.upstream.retry_base_delay_ms),
            request_timeout: Duration::from_millis(self.upstream.request_timeout_ms),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.upstream.detail_concurrency,
            window_delay: Duration::from_millis(self.upstream.window_delay_ms),
        }
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            batch_size: self.enrichment.batch_size,
            batch_delay: Duration::from_millis(self.enrichment.batch_delay_ms),
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            by_kind: self.cache.ttl_seconds.clone(),
            default_ttl_seconds: self.cache.default_ttl_seconds,
            stale_grace_seconds: self.cache.stale_grace_seconds,
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
