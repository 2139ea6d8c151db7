use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use flowtrail_core::{
    CoreError, Execution, ExecutionId, ExecutionRepository, ExecutionStatus, Flow, FlowId,
    FlowRepository, Step, StepId, StepRepository,
};

/// Row that belongs to exactly one flow
pub trait FlowScoped: Clone + Send + Sync {
    /// Row identifier
    type Id: Clone + Eq + Hash + Send + Sync;

    /// Identifier of this row
    fn id(&self) -> &Self::Id;

    /// Owning flow
    fn flow_id(&self) -> &FlowId;
}

impl FlowScoped for Step {
    type Id = StepId;

    fn id(&self) -> &StepId {
        &self.id
    }

    fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }
}

impl FlowScoped for Execution {
    type Id = ExecutionId;

    fn id(&self) -> &ExecutionId {
        &self.id
    }

    fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }
}

/// Table keyed by row id with a secondary index by flow
pub struct FlowScopedTable<R: FlowScoped> {
    rows: HashMap<R::Id, R>,
    by_flow: HashMap<FlowId, HashSet<R::Id>>,
}

impl<R: FlowScoped> Default for FlowScopedTable<R> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            by_flow: HashMap::new(),
        }
    }
}

impl<R: FlowScoped> FlowScopedTable<R> {
    fn get(&self, id: &R::Id) -> Option<&R> {
        self.rows.get(id)
    }

    fn upsert(&mut self, row: R) {
        let id = row.id().clone();
        if let Some(previous) = self.rows.get(&id) {
            if previous.flow_id() != row.flow_id() {
                let old_flow = previous.flow_id().clone();
                self.unindex(&old_flow, &id);
            }
        }
        self.by_flow
            .entry(row.flow_id().clone())
            .or_default()
            .insert(id.clone());
        self.rows.insert(id, row);
    }

    fn remove(&mut self, id: &R::Id) -> Option<R> {
        let row = self.rows.remove(id)?;
        self.unindex(row.flow_id(), id);
        Some(row)
    }

    fn unindex(&mut self, flow_id: &FlowId, id: &R::Id) {
        if let Some(ids) = self.by_flow.get_mut(flow_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_flow.remove(flow_id);
            }
        }
    }

    fn for_flow(&self, flow_id: &FlowId) -> impl Iterator<Item = &R> + '_ {
        self.by_flow
            .get(flow_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.rows.get(id))
    }

    fn remove_flow(&mut self, flow_id: &FlowId) -> Vec<R::Id> {
        let ids: Vec<R::Id> = self
            .by_flow
            .remove(flow_id)
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default();
        for id in &ids {
            self.rows.remove(id);
        }
        ids
    }
}

/// In-memory implementation of the FlowRepository
pub struct InMemoryFlowRepository {
    flows: Arc<RwLock<HashMap<FlowId, Flow>>>,
}

impl InMemoryFlowRepository {
    /// Create a new in-memory flow repository
    pub fn new(flows: Arc<RwLock<HashMap<FlowId, Flow>>>) -> Self {
        Self { flows }
    }
}

#[async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<Flow>, CoreError> {
        let flows = self.flows.read().await;
        Ok(flows.get(id).cloned())
    }

    async fn save(&self, flow: &Flow) -> Result<(), CoreError> {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn update(&self, flow: &Flow) -> Result<bool, CoreError> {
        let mut flows = self.flows.write().await;
        match flows.get_mut(&flow.id) {
            Some(stored) => {
                *stored = flow.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &FlowId) -> Result<bool, CoreError> {
        let mut flows = self.flows.write().await;
        Ok(flows.remove(id).is_some())
    }

    async fn find_all(&self) -> Result<Vec<Flow>, CoreError> {
        let flows = self.flows.read().await;
        let mut all: Vec<Flow> = flows.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

/// In-memory implementation of the StepRepository
pub struct InMemoryStepRepository {
    steps: Arc<RwLock<FlowScopedTable<Step>>>,
}

impl InMemoryStepRepository {
    /// Create a new in-memory step repository
    pub fn new(steps: Arc<RwLock<FlowScopedTable<Step>>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl StepRepository for InMemoryStepRepository {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<Step>, CoreError> {
        let steps = self.steps.read().await;
        Ok(steps.get(id).cloned())
    }

    async fn save(&self, step: &Step) -> Result<(), CoreError> {
        let mut steps = self.steps.write().await;
        steps.upsert(step.clone());
        Ok(())
    }

    async fn update(&self, step: &Step) -> Result<bool, CoreError> {
        let mut steps = self.steps.write().await;
        if steps.get(&step.id).is_none() {
            return Ok(false);
        }
        steps.upsert(step.clone());
        Ok(true)
    }

    async fn delete(&self, id: &StepId) -> Result<bool, CoreError> {
        let mut steps = self.steps.write().await;
        Ok(steps.remove(id).is_some())
    }

    async fn find_by_flow(&self, flow_id: &FlowId) -> Result<Vec<Step>, CoreError> {
        let steps = self.steps.read().await;
        Ok(steps.for_flow(flow_id).cloned().collect())
    }

    async fn delete_by_flow(&self, flow_id: &FlowId) -> Result<usize, CoreError> {
        let mut steps = self.steps.write().await;
        let removed = steps.remove_flow(flow_id);
        debug!("Removed {} steps of flow {}", removed.len(), flow_id);
        Ok(removed.len())
    }
}

/// In-memory implementation of the ExecutionRepository
pub struct InMemoryExecutionRepository {
    executions: Arc<RwLock<FlowScopedTable<Execution>>>,
}

impl InMemoryExecutionRepository {
    /// Create a new in-memory execution repository
    pub fn new(executions: Arc<RwLock<FlowScopedTable<Execution>>>) -> Self {
        Self { executions }
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, CoreError> {
        let executions = self.executions.read().await;
        Ok(executions.get(id).cloned())
    }

    async fn save(&self, execution: &Execution) -> Result<(), CoreError> {
        let mut executions = self.executions.write().await;
        executions.upsert(execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<bool, CoreError> {
        let mut executions = self.executions.write().await;
        if executions.get(&execution.id).is_none() {
            return Ok(false);
        }
        executions.upsert(execution.clone());
        Ok(true)
    }

    async fn find_by_flow(
        &self,
        flow_id: &FlowId,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<Execution>, CoreError> {
        let executions = self.executions.read().await;
        let mut matching: Vec<Execution> = executions
            .for_flow(flow_id)
            .filter(|execution| status.map_or(true, |s| execution.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching)
    }

    async fn delete_by_flow(&self, flow_id: &FlowId) -> Result<Vec<ExecutionId>, CoreError> {
        let mut executions = self.executions.write().await;
        let removed = executions.remove_flow(flow_id);
        debug!("Removed {} executions of flow {}", removed.len(), flow_id);
        Ok(removed)
    }
}
