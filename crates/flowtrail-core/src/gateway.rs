//! Remote-call gateway contract and retry policies
//!
//! The gateway is the engine's only genuinely unreliable dependency. The
//! engine calls it for `remote-call` steps and wraps each call in a timeout,
//! a cancellation signal and an optional [`RetryPolicy`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::types::JsonMap;
use crate::CoreError;

/// One parameter of a remote function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Parameter name
    pub name: String,
    /// Backend data type
    #[serde(rename = "type")]
    pub field_type: String,
    /// Maximum length, when the backend type has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Whether the caller may omit the parameter
    #[serde(default)]
    pub optional: bool,
    /// Value used by the backend when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    /// Mandatory parameter
    pub fn required(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            length: None,
            optional: false,
            default: None,
        }
    }

    /// Optional parameter
    pub fn optional(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(name, field_type)
        }
    }
}

/// Parameter structure of a remote function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    /// Function name
    pub function_name: String,
    /// Input parameters
    #[serde(default)]
    pub imports: Vec<FieldSpec>,
    /// Output parameters
    #[serde(default)]
    pub exports: Vec<FieldSpec>,
    /// Table parameters
    #[serde(default)]
    pub tables: Vec<FieldSpec>,
}

impl FunctionSchema {
    /// Schema with no declared parameters
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            ..Default::default()
        }
    }

    /// Check a parameter map against the schema.
    ///
    /// Missing required imports are errors. Parameters the schema does not
    /// declare are warnings, and only when the schema declares anything at all.
    pub fn check(&self, parameters: &JsonMap) -> ValidationReport {
        let mut report = ValidationReport::ok();

        for import in self.imports.iter().filter(|f| !f.optional) {
            if !parameters.contains_key(&import.name) {
                report
                    .errors
                    .push(format!("missing required parameter: {}", import.name));
            }
        }

        if !self.imports.is_empty() || !self.tables.is_empty() {
            for name in parameters.keys() {
                let declared = self
                    .imports
                    .iter()
                    .chain(self.tables.iter())
                    .any(|f| &f.name == name);
                if !declared {
                    report.warnings.push(format!("unknown parameter: {}", name));
                }
            }
        }

        report.valid = report.errors.is_empty();
        report
    }
}

/// Outcome of a pre-flight parameter check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the call may proceed
    pub valid: bool,
    /// Blocking problems
    #[serde(default)]
    pub errors: Vec<String>,
    /// Non-blocking remarks
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// A valid report with no remarks
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Outbound capability that executes a named function against a backend
///
/// `call` returns the backend's result document verbatim. A backend that
/// answers with a business-level failure still returns `Ok`; `Err` is
/// reserved for failures of the invocation itself.
#[async_trait]
pub trait RemoteCallGateway: Send + Sync {
    /// Invoke a remote function
    async fn call(&self, function_name: &str, parameters: &JsonMap) -> Result<Value, CoreError>;

    /// Describe a remote function's parameters
    async fn describe(&self, function_name: &str) -> Result<FunctionSchema, CoreError> {
        Ok(FunctionSchema::new(function_name))
    }

    /// Pre-flight check of a parameter map
    async fn validate(
        &self,
        function_name: &str,
        parameters: &JsonMap,
    ) -> Result<ValidationReport, CoreError> {
        let schema = self.describe(function_name).await?;
        Ok(schema.check(parameters))
    }

    /// Release backend connections
    async fn close(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Hook deciding whether a failed gateway call is attempted again
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the number of attempts already made, starting at 1.
    fn next_delay(&self, attempt: u32, error: &CoreError) -> Option<Duration>;
}

/// Never retry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &CoreError) -> Option<Duration> {
        None
    }
}

/// Retry retryable errors with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Growth factor between attempts
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl ExponentialBackoff {
    /// Calculate the delay that follows the given attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = (self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(exponent))
        .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, error: &CoreError) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        Some(self.calculate_delay(attempt))
    }
}
