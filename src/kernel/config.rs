use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::ConfigError;

/// Per-orchestrator policy knobs. Every field has a default so partial
/// TOML files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionCapabilities {
    /// Upper bound on units launched together in one parallel group.
    pub max_parallel_actions: usize,
    pub max_retries: u32,
    /// Per-unit deadline. Expiry counts as a recoverable failure.
    pub timeout_ms: u64,
    /// Delay before each retry, multiplied by the retry number.
    pub retry_backoff_ms: u64,
    /// When set, failed groups do not stop the run and partial effects are undone.
    pub rollback_enabled: bool,
    /// Actions scoring below this are skipped before planning.
    pub confidence_threshold: Option<f32>,
}

impl Default for ExecutionCapabilities {
    fn default() -> Self {
        Self {
            max_parallel_actions: 3,
            max_retries: 2,
            timeout_ms: 30_000,
            retry_backoff_ms: 200,
            rollback_enabled: false,
            confidence_threshold: None,
        }
    }
}

impl ExecutionCapabilities {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let caps: Self = toml::from_str(raw)?;
        caps.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Overlay `WEAVER_*` environment variables on top of `self`.
    ///
    /// Recognised: WEAVER_MAX_PARALLEL, WEAVER_MAX_RETRIES, WEAVER_TIMEOUT_MS,
    /// WEAVER_RETRY_BACKOFF_MS, WEAVER_ROLLBACK, WEAVER_CONFIDENCE_THRESHOLD.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WEAVER_MAX_PARALLEL") {
            self.max_parallel_actions = parse_value("WEAVER_MAX_PARALLEL", &v)?;
        }
        if let Some(v) = lookup("WEAVER_MAX_RETRIES") {
            self.max_retries = parse_value("WEAVER_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("WEAVER_TIMEOUT_MS") {
            self.timeout_ms = parse_value("WEAVER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("WEAVER_RETRY_BACKOFF_MS") {
            self.retry_backoff_ms = parse_value("WEAVER_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("WEAVER_ROLLBACK") {
            self.rollback_enabled = parse_value("WEAVER_ROLLBACK", &v)?;
        }
        if let Some(v) = lookup("WEAVER_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = Some(parse_value("WEAVER_CONFIDENCE_THRESHOLD", &v)?);
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_parallel_actions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_parallel_actions".into(),
                value: "0".into(),
            });
        }
        if let Some(t) = self.confidence_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::InvalidValue {
                    key: "confidence_threshold".into(),
                    value: t.to_string(),
                });
            }
        }
        Ok(self)
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_for(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(retry as u64))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
