//! Append-only in-memory log store
//!
//! Entries live in a table ordered by append sequence, with secondary
//! indices by id, execution and flow. Timestamps are clamped so they never
//! decrease in append order; reverse sequence order is therefore newest first.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use flowtrail_core::{
    CoreError, ExecutionId, FlowId, LogEntry, LogEntryId, LogQuery, LogRepository, LogStats,
    NewLogEntry, Timestamp, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};

/// Storage behind [`InMemoryLogRepository`]
#[derive(Default)]
pub struct LogTable {
    entries: BTreeMap<u64, LogEntry>,
    by_id: HashMap<LogEntryId, u64>,
    by_execution: HashMap<ExecutionId, BTreeSet<u64>>,
    by_flow: HashMap<FlowId, BTreeSet<u64>>,
    next_seq: u64,
    last_timestamp: Option<Timestamp>,
}

impl LogTable {
    fn append(&mut self, entry: NewLogEntry) -> LogEntry {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = entry.into_entry(LogEntryId::new_v4(), timestamp);
        self.by_id.insert(entry.id.clone(), seq);
        self.by_execution
            .entry(entry.execution_id.clone())
            .or_default()
            .insert(seq);
        self.by_flow
            .entry(entry.flow_id.clone())
            .or_default()
            .insert(seq);
        self.entries.insert(seq, entry.clone());
        entry
    }

    fn remove(&mut self, id: &LogEntryId) -> bool {
        let Some(seq) = self.by_id.remove(id) else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&seq) {
            remove_from_index(&mut self.by_execution, &entry.execution_id, seq);
            remove_from_index(&mut self.by_flow, &entry.flow_id, seq);
        }
        true
    }

    /// Candidate entries, newest first, narrowed by the most selective index available
    fn candidates<'a>(&'a self, query: &LogQuery) -> Box<dyn Iterator<Item = &'a LogEntry> + 'a> {
        let indexed = match (&query.execution_id, &query.flow_id) {
            (Some(execution_id), _) => Some(self.by_execution.get(execution_id)),
            (None, Some(flow_id)) => Some(self.by_flow.get(flow_id)),
            (None, None) => None,
        };

        match indexed {
            Some(None) => Box::new(std::iter::empty()),
            Some(Some(seqs)) => Box::new(
                seqs.iter()
                    .rev()
                    .filter_map(move |seq| self.entries.get(seq)),
            ),
            None => Box::new(self.entries.values().rev()),
        }
    }
}

fn remove_from_index<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeSet<u64>>,
    key: &K,
    seq: u64,
) {
    if let Some(seqs) = index.get_mut(key) {
        seqs.remove(&seq);
        if seqs.is_empty() {
            index.remove(key);
        }
    }
}

/// In-memory implementation of the LogRepository
pub struct InMemoryLogRepository {
    table: Arc<RwLock<LogTable>>,
}

impl InMemoryLogRepository {
    /// Create a new in-memory log repository
    pub fn new(table: Arc<RwLock<LogTable>>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, CoreError> {
        let mut table = self.table.write().await;
        let entry = table.append(entry);
        debug!(
            log_entry_id = %entry.id,
            execution_id = %entry.execution_id,
            level = %entry.level,
            "Log entry appended"
        );
        Ok(entry)
    }

    async fn find_by_id(&self, id: &LogEntryId) -> Result<Option<LogEntry>, CoreError> {
        let table = self.table.read().await;
        Ok(table
            .by_id
            .get(id)
            .and_then(|seq| table.entries.get(seq))
            .cloned())
    }

    async fn find_by_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Vec<LogEntry>, CoreError> {
        let table = self.table.read().await;
        Ok(table
            .by_execution
            .get(execution_id)
            .map(|seqs| {
                seqs.iter()
                    .filter_map(|seq| table.entries.get(seq))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search(&self, query: &LogQuery) -> Result<Vec<LogEntry>, CoreError> {
        let limit = query.effective_limit(DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let table = self.table.read().await;
        Ok(table
            .candidates(query)
            .filter(|entry| query.matches(entry))
            .skip(query.skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self, scope: &LogQuery) -> Result<LogStats, CoreError> {
        let table = self.table.read().await;
        Ok(table
            .candidates(scope)
            .filter(|entry| scope.matches(entry))
            .collect())
    }

    async fn delete(&self, id: &LogEntryId) -> Result<bool, CoreError> {
        let mut table = self.table.write().await;
        Ok(table.remove(id))
    }
}
