//! Repository traits for Flowtrail
//!
//! The registry and engine services only talk to storage through these
//! traits. External crates implement them to provide persistence.

use async_trait::async_trait;

use super::execution::{Execution, ExecutionStatus};
use super::flow::Flow;
use super::ids::{ExecutionId, FlowId, LogEntryId, StepId};
use super::log_entry::{LogEntry, LogQuery, LogStats, NewLogEntry};
use super::step::Step;
use crate::CoreError;

/// Repository for flow definitions
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// Find a flow by ID
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<Flow>, CoreError>;

    /// Insert or replace a flow
    async fn save(&self, flow: &Flow) -> Result<(), CoreError>;

    /// Replace a flow only if it is still stored; returns whether it was
    async fn update(&self, flow: &Flow) -> Result<bool, CoreError>;

    /// Delete a flow; returns whether it existed
    async fn delete(&self, id: &FlowId) -> Result<bool, CoreError>;

    /// Get all flows
    async fn find_all(&self) -> Result<Vec<Flow>, CoreError>;
}

/// Repository for steps, indexed by owning flow
#[async_trait]
pub trait StepRepository: Send + Sync {
    /// Find a step by ID
    async fn find_by_id(&self, id: &StepId) -> Result<Option<Step>, CoreError>;

    /// Insert or replace a step
    async fn save(&self, step: &Step) -> Result<(), CoreError>;

    /// Replace a step only if it is still stored; returns whether it was
    async fn update(&self, step: &Step) -> Result<bool, CoreError>;

    /// Delete a step; returns whether it existed
    async fn delete(&self, id: &StepId) -> Result<bool, CoreError>;

    /// All steps of a flow, in no particular order
    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Vec<Step>, CoreError>;

    /// Delete every step of a flow; returns how many were removed
    async fn delete_by_flow(&self, flow_id: &FlowId) -> Result<usize, CoreError>;
}

/// Repository for executions, indexed by flow
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Find an execution by ID
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, CoreError>;

    /// Insert or replace an execution
    async fn save(&self, execution: &Execution) -> Result<(), CoreError>;

    /// Replace an execution only if it is still stored; returns whether it was
    async fn update(&self, execution: &Execution) -> Result<bool, CoreError>;

    /// All executions of a flow, optionally narrowed to one status
    async fn find_by_flow(
        &self,
        flow_id: &FlowId,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<Execution>, CoreError>;

    /// Delete every execution of a flow; returns the removed ids
    async fn delete_by_flow(&self, flow_id: &FlowId) -> Result<Vec<ExecutionId>, CoreError>;
}

/// Append-only audit log store
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Assign an id and timestamp, store the entry and return it
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, CoreError>;

    /// Find an entry by ID
    async fn find_by_id(&self, id: &LogEntryId) -> Result<Option<LogEntry>, CoreError>;

    /// Every entry of an execution, in append order
    async fn find_by_execution(&self, execution_id: &ExecutionId)
        -> Result<Vec<LogEntry>, CoreError>;

    /// Entries matching every predicate of the query, newest first,
    /// after `skip` and truncated to the effective limit
    async fn search(&self, query: &LogQuery) -> Result<Vec<LogEntry>, CoreError>;

    /// Level counts over the entries matching the query; `skip` and `limit` are ignored
    async fn stats(&self, scope: &LogQuery) -> Result<LogStats, CoreError>;

    /// Administrative purge of a single entry; returns whether it existed
    async fn delete(&self, id: &LogEntryId) -> Result<bool, CoreError>;
}
