//! Engine configuration
//!
//! Every field has a default; `load` overrides them from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::log_entry::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use crate::error::{CoreError, CoreResult};

/// Gateway retry settings; one attempt means no retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Growth factor between attempts
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Whether more than one attempt is configured
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on one gateway call
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,

    /// Entries returned by a log search that names no limit
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,

    /// Largest limit a log search may request
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: usize,

    /// Engine-wide cap on loop iterations
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,

    /// Deepest allowed chain of nested subflow executions
    #[serde(default = "default_max_subflow_depth")]
    pub max_subflow_depth: usize,

    /// Gateway retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Run the gateway's pre-flight check before every remote call
    #[serde(default)]
    pub validate_before_call: bool,
}

fn default_gateway_timeout_ms() -> u64 {
    30_000
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_max_search_limit() -> usize {
    MAX_SEARCH_LIMIT
}

fn default_max_loop_iterations() -> usize {
    100
}

fn default_max_subflow_depth() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout_ms: default_gateway_timeout_ms(),
            default_search_limit: default_search_limit(),
            max_search_limit: default_max_search_limit(),
            max_loop_iterations: default_max_loop_iterations(),
            max_subflow_depth: default_max_subflow_depth(),
            retry: RetryConfig::default(),
            validate_before_call: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn load() -> CoreResult<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn load_from<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_from(&lookup, "FLOWTRAIL_GATEWAY_TIMEOUT_MS", &mut config.gateway_timeout_ms);
        override_from(&lookup, "FLOWTRAIL_SEARCH_DEFAULT_LIMIT", &mut config.default_search_limit);
        override_from(&lookup, "FLOWTRAIL_SEARCH_MAX_LIMIT", &mut config.max_search_limit);
        override_from(&lookup, "FLOWTRAIL_MAX_LOOP_ITERATIONS", &mut config.max_loop_iterations);
        override_from(&lookup, "FLOWTRAIL_MAX_SUBFLOW_DEPTH", &mut config.max_subflow_depth);
        override_from(&lookup, "FLOWTRAIL_RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts);
        override_from(&lookup, "FLOWTRAIL_RETRY_INITIAL_DELAY_MS", &mut config.retry.initial_delay_ms);
        override_from(
            &lookup,
            "FLOWTRAIL_RETRY_BACKOFF_MULTIPLIER",
            &mut config.retry.backoff_multiplier,
        );
        override_from(&lookup, "FLOWTRAIL_RETRY_MAX_DELAY_MS", &mut config.retry.max_delay_ms);

        if let Some(flag) = lookup("FLOWTRAIL_VALIDATE_BEFORE_CALL") {
            config.validate_before_call = flag.to_lowercase() == "true" || flag == "1";
        }

        config.validate()?;

        info!(
            gateway_timeout_ms = config.gateway_timeout_ms,
            retry_attempts = config.retry.max_attempts,
            "Engine configuration loaded"
        );

        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> CoreResult<()> {
        if self.gateway_timeout_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "gateway_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_search_limit > MAX_SEARCH_LIMIT {
            return Err(CoreError::ConfigurationError(format!(
                "max_search_limit {} exceeds the hard cap of {}",
                self.max_search_limit, MAX_SEARCH_LIMIT
            )));
        }
        if self.default_search_limit > self.max_search_limit {
            return Err(CoreError::ConfigurationError(format!(
                "default_search_limit {} exceeds max_search_limit {}",
                self.default_search_limit, self.max_search_limit
            )));
        }
        Ok(())
    }

    /// Gateway timeout as a duration
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", key, raw),
        }
    }
}
