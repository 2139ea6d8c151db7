//!
//! Flowtrail Core - domain model and execution engine for Flowtrail
//!
//! This crate defines flows, steps, executions and audit log entries, the
//! repository traits that store them, the remote-call gateway contract, and
//! the services that drive them: the flow registry, the execution engine
//! and the log service. Storage backends live in separate crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, value objects and repository interfaces
pub mod domain;

/// Application services - registry, engine, dispatch and log queries
pub mod application;

/// Remote-call gateway contract and retry policies
pub mod gateway;

/// Engine configuration
pub mod config;

/// Core types
pub mod types;

/// Error types
pub mod error;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use types::{json_map, JsonMap, Timestamp};

pub use config::{EngineConfig, RetryConfig};
pub use gateway::{
    ExponentialBackoff, FieldSpec, FunctionSchema, NoRetry, RemoteCallGateway, RetryPolicy,
    ValidationReport,
};

pub use domain::condition::{ConditionEvaluator, JmesPathConditionEvaluator};
pub use domain::execution::{CancelOutcome, Execution, ExecutionPatch, ExecutionStatus};
pub use domain::flow::{Flow, FlowPatch, FlowStatus, NewFlow};
pub use domain::ids::{ExecutionId, FlowId, LogEntryId, StepId, UserId};
pub use domain::log_entry::{
    LogEntry, LogLevel, LogQuery, LogStats, NewLogEntry, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
pub use domain::repository::{ExecutionRepository, FlowRepository, LogRepository, StepRepository};
pub use domain::step::{NewStep, Position, Step, StepPatch, StepType};

pub use application::dispatch::{StepContext, StepHandler, StepOutcome};
pub use application::execution_engine::ExecutionEngine;
pub use application::flow_registry::FlowRegistry;
pub use application::log_service::LogService;
