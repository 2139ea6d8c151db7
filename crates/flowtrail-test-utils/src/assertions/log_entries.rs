//! Assertion utilities for log entries and executions.

use flowtrail_core::{Execution, ExecutionStatus, LogEntry, LogLevel};
use thiserror::Error;

/// Error type for log and execution validation failures
#[derive(Debug, Error)]
pub enum LogValidationError {
    #[error("Entries out of order at position {position}: {newer} is older than {older}")]
    OutOfOrder {
        position: usize,
        newer: String,
        older: String,
    },

    #[error("Entry count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Level mismatch: expected {expected:?}, got {actual:?}")]
    LevelMismatch {
        expected: Vec<LogLevel>,
        actual: Vec<LogLevel>,
    },

    #[error("Message mismatch: expected {expected:?}, got {actual:?}")]
    MessageMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Invalid execution state: {0}")]
    InvalidExecution(String),
}

/// Asserts that entries are in non-increasing timestamp order.
pub fn assert_newest_first(entries: &[LogEntry]) -> Result<(), LogValidationError> {
    for (position, pair) in entries.windows(2).enumerate() {
        if pair[0].timestamp < pair[1].timestamp {
            return Err(LogValidationError::OutOfOrder {
                position,
                newer: pair[0].timestamp.to_rfc3339(),
                older: pair[1].timestamp.to_rfc3339(),
            });
        }
    }
    Ok(())
}

/// Asserts the levels of `entries`, in order.
pub fn assert_levels(entries: &[LogEntry], expected: &[LogLevel]) -> Result<(), LogValidationError> {
    let actual: Vec<LogLevel> = entries.iter().map(|entry| entry.level).collect();
    if actual != expected {
        return Err(LogValidationError::LevelMismatch {
            expected: expected.to_vec(),
            actual,
        });
    }
    Ok(())
}

/// Asserts the messages of `entries`, in order.
pub fn assert_messages(entries: &[LogEntry], expected: &[&str]) -> Result<(), LogValidationError> {
    if entries.len() != expected.len() {
        return Err(LogValidationError::CountMismatch {
            expected: expected.len(),
            actual: entries.len(),
        });
    }
    let actual: Vec<String> = entries.iter().map(|entry| entry.message.clone()).collect();
    if actual.iter().zip(expected).any(|(a, e)| a != e) {
        return Err(LogValidationError::MessageMismatch {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            actual,
        });
    }
    Ok(())
}

/// Asserts that `finished_at` is set exactly when the execution is no longer running.
pub fn assert_finish_time_consistent(execution: &Execution) -> Result<(), LogValidationError> {
    let running = execution.status == ExecutionStatus::Running;
    if running == execution.finished_at.is_some() {
        return Err(LogValidationError::InvalidExecution(format!(
            "execution {} is {} but finished_at is {:?}",
            execution.id, execution.status, execution.finished_at
        )));
    }
    Ok(())
}

/// Asserts that the execution ended with `expected` status.
pub fn assert_finished_with(
    execution: &Execution,
    expected: ExecutionStatus,
) -> Result<(), LogValidationError> {
    if execution.status != expected {
        return Err(LogValidationError::InvalidExecution(format!(
            "expected {}, got {}",
            expected, execution.status
        )));
    }
    assert_finish_time_consistent(execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use flowtrail_core::{ExecutionId, FlowId, LogEntryId, NewLogEntry, UserId};

    fn entry(message: &str, level: LogLevel, offset_ms: i64) -> LogEntry {
        NewLogEntry::new(
            FlowId::from("f1"),
            ExecutionId::from("e1"),
            UserId::from("u1"),
            level,
            message,
        )
        .into_entry(
            LogEntryId::new_v4(),
            Utc::now() + Duration::milliseconds(offset_ms),
        )
    }

    #[test]
    fn test_assert_newest_first() {
        let ordered = vec![entry("b", LogLevel::Info, 10), entry("a", LogLevel::Info, 0)];
        assert!(assert_newest_first(&ordered).is_ok());

        let reversed = vec![entry("a", LogLevel::Info, 0), entry("b", LogLevel::Info, 10)];
        assert!(matches!(
            assert_newest_first(&reversed),
            Err(LogValidationError::OutOfOrder { position: 0, .. })
        ));
    }

    #[test]
    fn test_assert_levels_and_messages() {
        let entries = vec![
            entry("failed", LogLevel::Error, 10),
            entry("execution started", LogLevel::Info, 0),
        ];
        assert!(assert_levels(&entries, &[LogLevel::Error, LogLevel::Info]).is_ok());
        assert!(assert_levels(&entries, &[LogLevel::Info, LogLevel::Info]).is_err());
        assert!(assert_messages(&entries, &["failed", "execution started"]).is_ok());
        assert!(matches!(
            assert_messages(&entries, &["failed"]),
            Err(LogValidationError::CountMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_assert_finished_with() {
        let mut execution = Execution::new(FlowId::from("f1"), UserId::from("u1"), None);
        assert!(assert_finish_time_consistent(&execution).is_ok());
        assert!(assert_finished_with(&execution, ExecutionStatus::Cancelled).is_err());

        execution.cancel();
        assert!(assert_finished_with(&execution, ExecutionStatus::Cancelled).is_ok());
    }
}
