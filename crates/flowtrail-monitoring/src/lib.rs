//! Monitoring module for the Flowtrail platform.
//!
//! Operational tracing output only; the audit trail of executions lives in
//! the log store of flowtrail-core.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

pub mod logging;
pub use logging::{init_logging, init_test_tracing, LogExt};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to startup logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log level filter (e.g., "info,flowtrail_core=debug"); `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    #[serde(default)]
    pub enable_json_logging: bool,
}

fn default_service_name() -> String {
    "flowtrail".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(service_name) = lookup("FLOWTRAIL_SERVICE_NAME") {
            config.service_name = service_name;
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_filter = log_level;
        }

        if let Some(json) = lookup("FLOWTRAIL_LOG_JSON") {
            match json.to_lowercase().as_str() {
                "true" | "1" => config.enable_json_logging = true,
                "false" | "0" => config.enable_json_logging = false,
                _ => warn!("Invalid FLOWTRAIL_LOG_JSON value: {}", json),
            }
        }

        config
    }
}

/// Initialize monitoring system
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    init_logging(config)?;
    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}
