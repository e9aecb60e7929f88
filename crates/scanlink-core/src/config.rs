//! Engine configuration.
//!
//! Defaults live here so the facade, the CLI and tests agree on them.
//! Every value can be overridden from a config file (serde) and the timeouts
//! also from the environment, see [`env_vars`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Routes, Topic};
use crate::wait::Policy;

/// Default deadline for multi-field aggregate waits.
pub const DEFAULT_AGGREGATE_TIMEOUT_MS: u64 = 1000;
/// Default deadline for single-field waits.
pub const DEFAULT_SINGLE_TIMEOUT_MS: u64 = 3000;
/// Default depth of the host's inbound message queue.
pub const DEFAULT_HOST_QUEUE_CAPACITY: usize = 256;

/// Invalid configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_aggregate_timeout_ms")]
    pub aggregate_timeout_ms: u64,

    #[serde(default = "default_single_timeout_ms")]
    pub single_timeout_ms: u64,

    #[serde(default = "default_host_queue_capacity")]
    pub host_queue_capacity: usize,

    /// Discriminators carrying command results.
    #[serde(default)]
    pub result_actions: Vec<String>,

    /// Discriminators carrying unsolicited data.
    #[serde(default)]
    pub data_actions: Vec<String>,
}

fn default_aggregate_timeout_ms() -> u64 {
    DEFAULT_AGGREGATE_TIMEOUT_MS
}

fn default_single_timeout_ms() -> u64 {
    DEFAULT_SINGLE_TIMEOUT_MS
}

fn default_host_queue_capacity() -> usize {
    DEFAULT_HOST_QUEUE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregate_timeout_ms: DEFAULT_AGGREGATE_TIMEOUT_MS,
            single_timeout_ms: DEFAULT_SINGLE_TIMEOUT_MS,
            host_queue_capacity: DEFAULT_HOST_QUEUE_CAPACITY,
            result_actions: Vec::new(),
            data_actions: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_vars::aggregate_timeout_ms() {
            self.aggregate_timeout_ms = ms;
        }
        if let Some(ms) = env_vars::single_timeout_ms() {
            self.single_timeout_ms = ms;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregate_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "aggregate_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.single_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "single_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.host_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "host_queue_capacity must be greater than zero".into(),
            ));
        }
        if let Some(action) = self
            .result_actions
            .iter()
            .find(|a| self.data_actions.contains(a))
        {
            return Err(ConfigError::Invalid(format!(
                "action '{}' is routed as both result and data",
                action
            )));
        }
        Ok(())
    }

    /// Routing table built from the configured actions.
    pub fn routes(&self) -> Routes {
        let mut routes = Routes::new();
        for action in &self.result_actions {
            routes.add(action.clone(), Topic::CommandResult);
        }
        for action in &self.data_actions {
            routes.add(action.clone(), Topic::Data);
        }
        routes
    }

    /// Partial-policy options with the aggregate deadline.
    pub fn aggregate_options(&self) -> IssueOptions {
        IssueOptions::partial(Duration::from_millis(self.aggregate_timeout_ms))
    }

    /// Strict-policy options with the single-field deadline.
    pub fn single_options(&self) -> IssueOptions {
        IssueOptions::strict(Duration::from_millis(self.single_timeout_ms))
    }
}

/// Per-issue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueOptions {
    pub timeout: Duration,
    pub policy: Policy,
}

impl IssueOptions {
    pub fn new(timeout: Duration, policy: Policy) -> Self {
        Self { timeout, policy }
    }

    pub fn strict(timeout: Duration) -> Self {
        Self::new(timeout, Policy::Strict)
    }

    pub fn partial(timeout: Duration) -> Self {
        Self::new(timeout, Policy::Partial)
    }

    /// Replace the timeout when `timeout_ms` is a positive value.
    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        if let Some(ms) = timeout_ms.filter(|ms| *ms > 0) {
            self.timeout = Duration::from_millis(ms);
        }
        self
    }
}

impl Default for IssueOptions {
    fn default() -> Self {
        Self::strict(Duration::from_millis(DEFAULT_SINGLE_TIMEOUT_MS))
    }
}

/// Environment variable names and readers.
pub mod env_vars {
    pub const AGGREGATE_TIMEOUT_MS: &str = "SCANLINK_AGGREGATE_TIMEOUT_MS";
    pub const SINGLE_TIMEOUT_MS: &str = "SCANLINK_SINGLE_TIMEOUT_MS";
    pub const LOG_JSON: &str = "SCANLINK_LOG_JSON";

    /// Aggregate deadline override; unparsable or zero values are ignored.
    pub fn aggregate_timeout_ms() -> Option<u64> {
        positive_u64(AGGREGATE_TIMEOUT_MS)
    }

    /// Single-field deadline override; unparsable or zero values are ignored.
    pub fn single_timeout_ms() -> Option<u64> {
        positive_u64(SINGLE_TIMEOUT_MS)
    }

    /// Whether logs should be emitted as JSON.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }

    fn positive_u64(name: &str) -> Option<u64> {
        std::env::var(name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|v| *v > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.aggregate_timeout_ms, 1000);
        assert_eq!(config.single_timeout_ms, 3000);
        assert!(config.validate().is_ok());

        assert_eq!(config.aggregate_options().policy, Policy::Partial);
        assert_eq!(config.single_options().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"aggregate_timeout_ms": 250, "result_actions": ["r"]}"#)
                .unwrap();
        assert_eq!(config.aggregate_timeout_ms, 250);
        assert_eq!(config.single_timeout_ms, DEFAULT_SINGLE_TIMEOUT_MS);
        assert_eq!(config.routes().topic_of("r"), Some(Topic::CommandResult));
    }

    #[test]
    fn test_validate_rejects_zero_and_overlap() {
        let config = EngineConfig {
            single_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            result_actions: vec!["x".into()],
            data_actions: vec!["x".into()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_with_timeout_ms_ignores_non_positive() {
        let options = IssueOptions::partial(Duration::from_millis(1000));
        assert_eq!(options.with_timeout_ms(None).timeout, Duration::from_millis(1000));
        assert_eq!(options.with_timeout_ms(Some(0)).timeout, Duration::from_millis(1000));
        assert_eq!(options.with_timeout_ms(Some(40)).timeout, Duration::from_millis(40));
    }
}
