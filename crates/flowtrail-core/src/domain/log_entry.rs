//! Audit log entries and the query model of the log store

use super::ids::{ExecutionId, FlowId, LogEntryId, StepId, UserId};
use crate::types::{JsonMap, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of entries returned by a search that names no limit
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Largest number of entries a single search may return
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Normal progress
    Info,
    /// Something unexpected that did not fail the operation
    Warn,
    /// A failed operation
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier
    pub id: LogEntryId,
    /// Flow the event belongs to
    pub flow_id: FlowId,
    /// Execution the event belongs to
    pub execution_id: ExecutionId,
    /// Step the event belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// User the execution runs for
    pub user_id: UserId,
    /// Severity
    pub level: LogLevel,
    /// Human-readable summary
    pub message: String,
    /// Structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonMap>,
    /// Creation time; non-decreasing in append order
    pub timestamp: Timestamp,
}

/// Fields supplied by the caller when appending an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    /// Flow the event belongs to
    pub flow_id: FlowId,
    /// Execution the event belongs to
    pub execution_id: ExecutionId,
    /// Step the event belongs to, if any
    #[serde(default)]
    pub step_id: Option<StepId>,
    /// User the execution runs for
    pub user_id: UserId,
    /// Severity
    pub level: LogLevel,
    /// Human-readable summary
    pub message: String,
    /// Structured payload
    #[serde(default)]
    pub details: Option<JsonMap>,
}

impl NewLogEntry {
    /// Entry without step or details
    pub fn new(
        flow_id: FlowId,
        execution_id: ExecutionId,
        user_id: UserId,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            flow_id,
            execution_id,
            step_id: None,
            user_id,
            level,
            message: message.into(),
            details: None,
        }
    }

    /// Tag the entry with a step
    pub fn for_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    /// Attach structured details
    pub fn with_details(mut self, details: JsonMap) -> Self {
        self.details = Some(details);
        self
    }

    /// Freeze the request into a stored entry
    pub fn into_entry(self, id: LogEntryId, timestamp: Timestamp) -> LogEntry {
        LogEntry {
            id,
            flow_id: self.flow_id,
            execution_id: self.execution_id,
            step_id: self.step_id,
            user_id: self.user_id,
            level: self.level,
            message: self.message,
            details: self.details,
            timestamp,
        }
    }
}

/// Conjunctive filter over log entries. Every supplied predicate must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Match on flow
    #[serde(default)]
    pub flow_id: Option<FlowId>,
    /// Match on execution
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    /// Match on step
    #[serde(default)]
    pub step_id: Option<StepId>,
    /// Match on user
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Match on level
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the message
    #[serde(default)]
    pub message: Option<String>,
    /// Inclusive lower bound on the timestamp
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    /// Inclusive upper bound on the timestamp
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Maximum number of entries; 0 or absent means the default
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of matching entries to skip, newest first
    #[serde(default)]
    pub skip: usize,
}

impl LogQuery {
    /// Query for every entry of one execution
    pub fn for_execution(execution_id: ExecutionId) -> Self {
        Self {
            execution_id: Some(execution_id),
            ..Default::default()
        }
    }

    /// Query for every entry of one flow
    pub fn for_flow(flow_id: FlowId) -> Self {
        Self {
            flow_id: Some(flow_id),
            ..Default::default()
        }
    }

    /// Set the level predicate
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Limit actually applied, given the store's default and hard cap
    pub fn effective_limit(&self, default_limit: usize, max_limit: usize) -> usize {
        let cap = max_limit.min(MAX_SEARCH_LIMIT);
        match self.limit {
            None | Some(0) => default_limit.min(cap),
            Some(limit) => limit.min(cap),
        }
    }

    /// Whether an entry satisfies every supplied predicate
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(flow_id) = &self.flow_id {
            if &entry.flow_id != flow_id {
                return false;
            }
        }
        if let Some(execution_id) = &self.execution_id {
            if &entry.execution_id != execution_id {
                return false;
            }
        }
        if let Some(step_id) = &self.step_id {
            if entry.step_id.as_ref() != Some(step_id) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if &entry.user_id != user_id {
                return false;
            }
        }
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(needle) = &self.message {
            if !entry
                .message
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Per-level counts over a scope of entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    /// Number of entries in scope
    pub total: usize,
    /// Info entries
    pub info: usize,
    /// Warn entries
    pub warn: usize,
    /// Error entries
    pub error: usize,
    /// `error / total`, 0 when there are no entries
    pub error_rate: f64,
}

impl LogStats {
    /// Count one entry
    pub fn record(&mut self, level: LogLevel) {
        self.total += 1;
        match level {
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
        }
        self.error_rate = self.error as f64 / self.total as f64;
    }
}

impl<'a> FromIterator<&'a LogEntry> for LogStats {
    fn from_iter<I: IntoIterator<Item = &'a LogEntry>>(iter: I) -> Self {
        let mut stats = LogStats::default();
        for entry in iter {
            stats.record(entry.level);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn entry(level: LogLevel, message: &str) -> LogEntry {
        NewLogEntry::new(
            FlowId::from("f1"),
            ExecutionId::from("e1"),
            UserId::from("u1"),
            level,
            message,
        )
        .for_step(StepId::from("s1"))
        .into_entry(LogEntryId::new_v4(), Utc::now())
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(LogQuery::default().matches(&entry(LogLevel::Info, "anything")));
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let e = entry(LogLevel::Error, "Step Fetch Order failed");
        let query = LogQuery {
            execution_id: Some(ExecutionId::from("e1")),
            level: Some(LogLevel::Error),
            ..Default::default()
        };
        assert!(query.matches(&e));

        let query = LogQuery {
            execution_id: Some(ExecutionId::from("e1")),
            user_id: Some(UserId::from("someone-else")),
            ..Default::default()
        };
        assert!(!query.matches(&e));
    }

    #[test]
    fn test_message_match_is_case_insensitive_substring() {
        let e = entry(LogLevel::Info, "Execution STARTED");
        let query = LogQuery {
            message: Some("started".into()),
            ..Default::default()
        };
        assert!(query.matches(&e));
    }

    #[test]
    fn test_step_predicate_rejects_entries_without_step() {
        let mut e = entry(LogLevel::Info, "execution started");
        e.step_id = None;
        let query = LogQuery {
            step_id: Some(StepId::from("s1")),
            ..Default::default()
        };
        assert!(!query.matches(&e));
    }

    #[test]
    fn test_time_bounds_are_inclusive() {
        let e = entry(LogLevel::Info, "m");
        let query = LogQuery {
            start_time: Some(e.timestamp),
            end_time: Some(e.timestamp),
            ..Default::default()
        };
        assert!(query.matches(&e));

        let query = LogQuery {
            start_time: Some(e.timestamp + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!query.matches(&e));
    }

    #[test]
    fn test_effective_limit() {
        let q = LogQuery::default();
        assert_eq!(q.effective_limit(100, 1000), 100);
        assert_eq!(q.clone().with_limit(0).effective_limit(100, 1000), 100);
        assert_eq!(q.clone().with_limit(5).effective_limit(100, 1000), 5);
        assert_eq!(q.clone().with_limit(5000).effective_limit(100, 1000), 1000);
        assert_eq!(q.with_limit(5000).effective_limit(100, 50_000), MAX_SEARCH_LIMIT);
    }

    #[test]
    fn test_stats_error_rate() {
        assert_eq!(LogStats::default().error_rate, 0.0);

        let entries = vec![
            entry(LogLevel::Info, "a"),
            entry(LogLevel::Warn, "b"),
            entry(LogLevel::Error, "c"),
            entry(LogLevel::Info, "d"),
        ];
        let stats: LogStats = entries.iter().collect();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.info, 2);
        assert_eq!(stats.warn, 1);
        assert_eq!(stats.error, 1);
        assert!((stats.error_rate - 0.25).abs() < f64::EPSILON);
    }
}
