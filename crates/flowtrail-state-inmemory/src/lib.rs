//! In-memory state store for Flowtrail
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in flowtrail-core. It is useful for development,
//! testing, and deployments where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    FlowScoped, FlowScopedTable, InMemoryExecutionRepository, InMemoryFlowRepository,
    InMemoryStepRepository,
};

pub mod log_store;
pub use log_store::{InMemoryLogRepository, LogTable};

use flowtrail_core::{
    Execution, ExecutionRepository, Flow, FlowId, FlowRepository, LogRepository, Step,
    StepRepository,
};

/// Provider for in-memory state store repositories
///
/// Repositories created by the same provider share storage.
pub struct InMemoryStateStoreProvider {
    // Shared storage for flows
    flows: Arc<RwLock<HashMap<FlowId, Flow>>>,

    // Shared storage for steps, indexed by flow
    steps: Arc<RwLock<FlowScopedTable<Step>>>,

    // Shared storage for executions, indexed by flow
    executions: Arc<RwLock<FlowScopedTable<Execution>>>,

    // Shared append-only log
    logs: Arc<RwLock<LogTable>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
            steps: Arc::new(RwLock::new(FlowScopedTable::default())),
            executions: Arc::new(RwLock::new(FlowScopedTable::default())),
            logs: Arc::new(RwLock::new(LogTable::default())),
        }
    }

    /// Create repositories for the registry, engine and log service
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn FlowRepository>,
        Arc<dyn StepRepository>,
        Arc<dyn ExecutionRepository>,
        Arc<dyn LogRepository>,
    ) {
        let flow_repo = Arc::new(InMemoryFlowRepository::new(self.flows.clone()));
        let step_repo = Arc::new(InMemoryStepRepository::new(self.steps.clone()));
        let execution_repo = Arc::new(InMemoryExecutionRepository::new(self.executions.clone()));
        let log_repo = Arc::new(InMemoryLogRepository::new(self.logs.clone()));

        (flow_repo, step_repo, execution_repo, log_repo)
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
