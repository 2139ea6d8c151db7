/// Identifier value objects
pub mod ids;

/// Flow definitions
pub mod flow;

/// Steps and step types
pub mod step;

/// Executions and their lifecycle
pub mod execution;

/// Audit log entries and queries
pub mod log_entry;

/// Condition and path evaluation
pub mod condition;

/// Repository interfaces
pub mod repository;
