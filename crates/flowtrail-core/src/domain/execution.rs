use super::ids::{ExecutionId, FlowId, StepId, UserId};
use crate::types::{JsonMap, Timestamp};
use crate::CoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Execution is in progress
    Running,
    /// Execution finished successfully
    Completed,
    /// Execution finished with a failure
    Failed,
    /// Execution was stopped by a caller
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the status ends the execution
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Aggregate: one instantiation of a flow
///
/// `finished_at` is `None` exactly while `status` is [`ExecutionStatus::Running`];
/// it is stamped once, on the first transition into a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier
    pub id: ExecutionId,
    /// Flow being executed
    pub flow_id: FlowId,
    /// User the execution runs for
    pub user_id: UserId,
    /// Parameters supplied at start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_parameters: Option<JsonMap>,
    /// Current status
    pub status: ExecutionStatus,
    /// Last step reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<StepId>,
    /// Start timestamp
    pub started_at: Timestamp,
    /// Finish timestamp
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    /// Outcome document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonMap>,
    /// Execution whose subflow step started this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
    /// The subflow step of the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step_id: Option<StepId>,
}

/// Partial update of an execution; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPatch {
    /// New status
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    /// New position in the flow
    #[serde(default)]
    pub current_step_id: Option<StepId>,
    /// Replacement outcome document
    #[serde(default)]
    pub result: Option<JsonMap>,
}

impl ExecutionPatch {
    /// Patch that only changes the status
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch that only moves the execution to a step
    pub fn current_step(step_id: StepId) -> Self {
        Self {
            current_step_id: Some(step_id),
            ..Default::default()
        }
    }
}

/// What a cancel request did to an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The execution is now cancelled
    Cancelled,
    /// The execution had already been cancelled; nothing changed
    AlreadyCancelled,
}

impl Execution {
    /// Create a running execution
    pub fn new(flow_id: FlowId, user_id: UserId, initial_parameters: Option<JsonMap>) -> Self {
        Self {
            id: ExecutionId::new_v4(),
            flow_id,
            user_id,
            initial_parameters,
            status: ExecutionStatus::Running,
            current_step_id: None,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            parent_execution_id: None,
            parent_step_id: None,
        }
    }

    /// Whether the execution has reached a terminal status
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update.
    ///
    /// A terminal execution cannot be moved back to `running`. Entering a
    /// terminal status stamps `finished_at` only if it is not already set.
    pub fn apply(&mut self, patch: ExecutionPatch) -> Result<(), CoreError> {
        if let Some(status) = patch.status {
            if self.is_finished() && !status.is_terminal() {
                return Err(CoreError::ValidationError(format!(
                    "execution {} is already {} and cannot return to {}",
                    self.id, self.status, status
                )));
            }
            self.status = status;
            if status.is_terminal() && self.finished_at.is_none() {
                self.finished_at = Some(Utc::now());
            }
        }
        if let Some(step_id) = patch.current_step_id {
            self.current_step_id = Some(step_id);
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        Ok(())
    }

    /// Force the execution to `cancelled`.
    ///
    /// Repeated cancellation is a no-op. A completed or failed execution keeps
    /// its first `finished_at`.
    pub fn cancel(&mut self) -> CancelOutcome {
        if self.status == ExecutionStatus::Cancelled {
            return CancelOutcome::AlreadyCancelled;
        }
        self.status = ExecutionStatus::Cancelled;
        self.finished_at.get_or_insert_with(Utc::now);
        CancelOutcome::Cancelled
    }
}
