use crate::{
    config::EngineConfig,
    domain::ids::{ExecutionId, LogEntryId},
    domain::log_entry::{LogEntry, LogLevel, LogQuery, LogStats, NewLogEntry},
    domain::repository::LogRepository,
    CoreError,
};
use std::sync::Arc;

/// Read and administration surface of the audit log
pub struct LogService {
    /// Log store
    log_repo: Arc<dyn LogRepository>,

    /// Limit used when a query names none
    default_limit: usize,

    /// Largest limit a query may request
    max_limit: usize,
}

impl LogService {
    /// Create a new log service
    pub fn new(log_repo: Arc<dyn LogRepository>, config: &EngineConfig) -> Self {
        Self {
            log_repo,
            default_limit: config.default_search_limit,
            max_limit: config.max_search_limit,
        }
    }

    /// Append an entry written by a caller rather than by the engine
    pub async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, CoreError> {
        if entry.message.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "log message must not be empty".to_string(),
            ));
        }
        self.log_repo.append(entry).await
    }

    /// Get an entry by ID
    pub async fn get(&self, id: &LogEntryId) -> Result<LogEntry, CoreError> {
        self.log_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("log entry", id.as_str()))
    }

    /// Every entry of an execution, in append order
    pub async fn for_execution(&self, execution_id: &ExecutionId) -> Result<Vec<LogEntry>, CoreError> {
        self.log_repo.find_by_execution(execution_id).await
    }

    /// Filtered search, newest first
    pub async fn search(&self, query: LogQuery) -> Result<Vec<LogEntry>, CoreError> {
        let query = self.normalize(query);
        self.log_repo.search(&query).await
    }

    /// Most recent error entries within a scope
    pub async fn recent_errors(
        &self,
        scope: LogQuery,
        limit: usize,
    ) -> Result<Vec<LogEntry>, CoreError> {
        self.search(scope.with_level(LogLevel::Error).with_limit(limit))
            .await
    }

    /// Level counts and error rate within a scope
    pub async fn stats(&self, scope: &LogQuery) -> Result<LogStats, CoreError> {
        self.log_repo.stats(scope).await
    }

    /// Administrative purge of a single entry
    pub async fn delete(&self, id: &LogEntryId) -> Result<(), CoreError> {
        if !self.log_repo.delete(id).await? {
            return Err(CoreError::not_found("log entry", id.as_str()));
        }
        tracing::info!(log_entry_id = %id, "Log entry purged");
        Ok(())
    }

    fn normalize(&self, mut query: LogQuery) -> LogQuery {
        query.limit = Some(query.effective_limit(self.default_limit, self.max_limit));
        query
    }
}
