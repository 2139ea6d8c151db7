use super::locks::SharedLocks;
use crate::{
    domain::flow::{Flow, FlowPatch, FlowStatus, NewFlow},
    domain::ids::{FlowId, StepId},
    domain::repository::{ExecutionRepository, FlowRepository, StepRepository},
    domain::step::{NewStep, Step, StepPatch},
    CoreError,
};
use std::sync::Arc;

/// Service owning flows and their steps
pub struct FlowRegistry {
    /// Repository for flows
    flow_repo: Arc<dyn FlowRepository>,

    /// Repository for steps
    step_repo: Arc<dyn StepRepository>,

    /// Repository for executions, needed for cascading deletes
    execution_repo: Arc<dyn ExecutionRepository>,

    /// Shared with every engine built from this registry
    locks: SharedLocks,
}

impl FlowRegistry {
    /// Create a new flow registry
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        step_repo: Arc<dyn StepRepository>,
        execution_repo: Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self {
            flow_repo,
            step_repo,
            execution_repo,
            locks: SharedLocks::default(),
        }
    }

    pub(crate) fn flow_repo(&self) -> Arc<dyn FlowRepository> {
        self.flow_repo.clone()
    }

    pub(crate) fn step_repo(&self) -> Arc<dyn StepRepository> {
        self.step_repo.clone()
    }

    pub(crate) fn execution_repo(&self) -> Arc<dyn ExecutionRepository> {
        self.execution_repo.clone()
    }

    pub(crate) fn locks(&self) -> &SharedLocks {
        &self.locks
    }

    /// Register a new flow in `draft`
    pub async fn create_flow(&self, new_flow: NewFlow) -> Result<Flow, CoreError> {
        let flow = Flow::new(new_flow);
        self.flow_repo.save(&flow).await?;

        tracing::info!(
            flow_id = %flow.id,
            name = %flow.name,
            version = %flow.version,
            "Flow created"
        );

        Ok(flow)
    }

    /// List every flow
    pub async fn list_flows(&self) -> Result<Vec<Flow>, CoreError> {
        self.flow_repo.find_all().await
    }

    /// Get a flow by ID
    pub async fn get_flow(&self, id: &FlowId) -> Result<Flow, CoreError> {
        self.flow_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("flow", id.as_str()))
    }

    /// Merge the supplied fields into a flow.
    ///
    /// A patch with no fields returns the flow untouched.
    pub async fn update_flow(&self, id: &FlowId, patch: FlowPatch) -> Result<Flow, CoreError> {
        let _registry = self.locks.registry.read().await;
        self.patch_flow(id, patch).await
    }

    async fn patch_flow(&self, id: &FlowId, patch: FlowPatch) -> Result<Flow, CoreError> {
        let mut flow = self.get_flow(id).await?;
        if patch.is_empty() {
            return Ok(flow);
        }

        flow.apply(patch);
        if !self.flow_repo.update(&flow).await? {
            return Err(CoreError::not_found("flow", id.as_str()));
        }

        tracing::debug!(flow_id = %flow.id, status = ?flow.status, "Flow updated");

        Ok(flow)
    }

    /// Mark a flow as published
    pub async fn publish(&self, id: &FlowId) -> Result<Flow, CoreError> {
        self.transition(id, FlowStatus::Published).await
    }

    /// Archive a flow; archived flows accept no new executions
    pub async fn archive(&self, id: &FlowId) -> Result<Flow, CoreError> {
        self.transition(id, FlowStatus::Archived).await
    }

    async fn transition(&self, id: &FlowId, target: FlowStatus) -> Result<Flow, CoreError> {
        // Exclusive so two transitions cannot both pass the check
        let _registry = self.locks.registry.write().await;
        let flow = self.get_flow(id).await?;
        let allowed = matches!(
            (flow.status, target),
            (FlowStatus::Draft, FlowStatus::Published)
                | (FlowStatus::Draft, FlowStatus::Archived)
                | (FlowStatus::Published, FlowStatus::Archived)
        ) || flow.status == target;

        if !allowed {
            return Err(CoreError::ValidationError(format!(
                "flow {} cannot move from {:?} to {:?}",
                id, flow.status, target
            )));
        }

        self.patch_flow(
            id,
            FlowPatch {
                status: Some(target),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a flow together with its steps and executions.
    ///
    /// In-flight steps of the removed executions are cancelled.
    pub async fn delete_flow(&self, id: &FlowId) -> Result<(), CoreError> {
        let _registry = self.locks.registry.write().await;

        // Ensure the flow exists before touching dependents
        self.get_flow(id).await?;

        let steps_deleted = self.step_repo.delete_by_flow(id).await?;
        let executions_deleted = self.execution_repo.delete_by_flow(id).await?;
        self.locks.slots.forget(&executions_deleted);

        if !self.flow_repo.delete(id).await? {
            return Err(CoreError::not_found("flow", id.as_str()));
        }

        tracing::info!(
            flow_id = %id,
            steps_deleted,
            executions_deleted = executions_deleted.len(),
            "Flow deleted"
        );

        Ok(())
    }

    /// Add a step to an existing flow
    pub async fn create_step(&self, new_step: NewStep) -> Result<Step, CoreError> {
        let _registry = self.locks.registry.read().await;
        if self.flow_repo.find_by_id(&new_step.flow_id).await?.is_none() {
            return Err(CoreError::ValidationError(format!(
                "flow does not exist: {}",
                new_step.flow_id
            )));
        }

        let step = Step::new(new_step);
        self.step_repo.save(&step).await?;

        tracing::info!(
            flow_id = %step.flow_id,
            step_id = %step.id,
            step_type = %step.step_type,
            "Step created"
        );

        Ok(step)
    }

    /// All steps of a flow, in no particular order
    pub async fn list_steps(&self, flow_id: &FlowId) -> Result<Vec<Step>, CoreError> {
        self.step_repo.find_by_flow(flow_id).await
    }

    /// Get a step by ID
    pub async fn get_step(&self, id: &StepId) -> Result<Step, CoreError> {
        self.step_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("step", id.as_str()))
    }

    /// Merge the supplied fields into a step
    pub async fn update_step(&self, id: &StepId, patch: StepPatch) -> Result<Step, CoreError> {
        let _registry = self.locks.registry.read().await;
        let mut step = self.get_step(id).await?;
        step.apply(patch);
        if !self.step_repo.update(&step).await? {
            return Err(CoreError::not_found("step", id.as_str()));
        }

        tracing::debug!(
            step_id = %step.id,
            flow_id = %step.flow_id,
            step_type = %step.step_type,
            "Step updated"
        );

        Ok(step)
    }

    /// Delete a step
    pub async fn delete_step(&self, id: &StepId) -> Result<(), CoreError> {
        if !self.step_repo.delete(id).await? {
            return Err(CoreError::not_found("step", id.as_str()));
        }
        tracing::debug!(step_id = %id, "Step deleted");
        Ok(())
    }
}
