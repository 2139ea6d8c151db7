//! Execution engine
//!
//! Every execution is a unit of mutual exclusion: `execute_step`, `update`
//! and `cancel` on the same execution serialize on a per-execution lock,
//! while distinct executions proceed in parallel. Each outcome is appended
//! to the log store before the call returns. Slots are dropped once their
//! execution is finished or deleted and nobody is waiting on them.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::dispatch::{
    ConditionHandler, InputHandler, LoopHandler, OutputHandler, PassThroughHandler,
    RemoteCallHandler, StepContext, StepHandler, SubflowHandler,
};
use super::flow_registry::FlowRegistry;
use super::locks::{ExecutionSlot, SharedLocks, SlotTable};
use crate::config::EngineConfig;
use crate::domain::condition::JmesPathConditionEvaluator;
use crate::domain::execution::{CancelOutcome, Execution, ExecutionPatch, ExecutionStatus};
use crate::domain::ids::{ExecutionId, FlowId, StepId, UserId};
use crate::domain::log_entry::{LogLevel, NewLogEntry};
use crate::domain::repository::{
    ExecutionRepository, FlowRepository, LogRepository, StepRepository,
};
use crate::domain::step::{Step, StepType};
use crate::error::ErrorKind;
use crate::gateway::{ExponentialBackoff, NoRetry, RemoteCallGateway, RetryPolicy};
use crate::types::JsonMap;
use crate::CoreError;

/// Nested execution's link to the step that started it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    /// Execution running the subflow step
    pub execution_id: ExecutionId,
    /// The subflow step
    pub step_id: StepId,
    /// Nesting depth of the new execution
    pub depth: usize,
}

/// Creates executions; shared by the engine and the subflow handler
pub struct ExecutionStarter {
    flow_repo: Arc<dyn FlowRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    log_repo: Arc<dyn LogRepository>,
    locks: SharedLocks,
}

impl ExecutionStarter {
    /// Validate the flow, store a running execution and log its start
    pub async fn start(
        &self,
        flow_id: FlowId,
        user_id: UserId,
        initial_parameters: Option<JsonMap>,
        parent: Option<ParentLink>,
    ) -> Result<Execution, CoreError> {
        let registry = self.locks.registry.read().await;
        let flow = self
            .flow_repo
            .find_by_id(&flow_id)
            .await?
            .ok_or_else(|| CoreError::ValidationError(format!("flow does not exist: {}", flow_id)))?;

        if !flow.accepts_executions() {
            return Err(CoreError::ValidationError(format!(
                "flow {} is archived and cannot be started",
                flow.id
            )));
        }

        let mut execution = Execution::new(flow.id, user_id, initial_parameters);
        if let Some(parent) = &parent {
            execution.parent_execution_id = Some(parent.execution_id.clone());
            execution.parent_step_id = Some(parent.step_id.clone());
        }
        self.execution_repo.save(&execution).await?;
        self.locks
            .slots
            .register(&execution.id, parent.as_ref().map_or(0, |p| p.depth));
        drop(registry);

        let mut details = JsonMap::new();
        details.insert(
            "initial_parameters".to_string(),
            json!(execution.initial_parameters),
        );
        if let Some(parent) = &parent {
            details.insert("parent_execution_id".to_string(), json!(parent.execution_id));
            details.insert("parent_step_id".to_string(), json!(parent.step_id));
        }

        self.log_repo
            .append(
                NewLogEntry::new(
                    execution.flow_id.clone(),
                    execution.id.clone(),
                    execution.user_id.clone(),
                    LogLevel::Info,
                    "execution started",
                )
                .with_details(details),
            )
            .await?;

        tracing::info!(
            execution_id = %execution.id,
            flow_id = %execution.flow_id,
            user_id = %execution.user_id,
            parent_execution_id = parent.as_ref().map(|p| p.execution_id.as_str()),
            "Execution started"
        );

        Ok(execution)
    }
}

/// Service owning executions and dispatching their steps
pub struct ExecutionEngine {
    step_repo: Arc<dyn StepRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    log_repo: Arc<dyn LogRepository>,
    starter: Arc<ExecutionStarter>,
    slots: Arc<SlotTable>,
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl ExecutionEngine {
    /// Create an engine over the registry's stores with the built-in handler for every step type
    pub fn new(
        registry: &FlowRegistry,
        log_repo: Arc<dyn LogRepository>,
        gateway: Arc<dyn RemoteCallGateway>,
        config: &EngineConfig,
    ) -> Self {
        let retry_policy: Arc<dyn RetryPolicy> = if config.retry.is_enabled() {
            Arc::new(ExponentialBackoff::from(&config.retry))
        } else {
            Arc::new(NoRetry)
        };
        Self::with_retry_policy(registry, log_repo, gateway, retry_policy, config)
    }

    /// Create an engine with a caller-supplied retry policy for gateway calls
    pub fn with_retry_policy(
        registry: &FlowRegistry,
        log_repo: Arc<dyn LogRepository>,
        gateway: Arc<dyn RemoteCallGateway>,
        retry_policy: Arc<dyn RetryPolicy>,
        config: &EngineConfig,
    ) -> Self {
        let locks = registry.locks().clone();
        let execution_repo = registry.execution_repo();
        let starter = Arc::new(ExecutionStarter {
            flow_repo: registry.flow_repo(),
            execution_repo: execution_repo.clone(),
            log_repo: log_repo.clone(),
            locks: locks.clone(),
        });

        let mut engine = Self {
            step_repo: registry.step_repo(),
            execution_repo,
            log_repo,
            starter: starter.clone(),
            slots: locks.slots,
            handlers: HashMap::new(),
        };

        engine.register_handler(Arc::new(RemoteCallHandler::new(
            gateway,
            retry_policy,
            config.gateway_timeout(),
            config.validate_before_call,
        )));
        engine.register_handler(Arc::new(ConditionHandler::new(Arc::new(
            JmesPathConditionEvaluator,
        ))));
        engine.register_handler(Arc::new(LoopHandler::new(config.max_loop_iterations)));
        engine.register_handler(Arc::new(InputHandler));
        engine.register_handler(Arc::new(OutputHandler));
        engine.register_handler(Arc::new(SubflowHandler::new(
            starter,
            config.max_subflow_depth,
        )));
        engine
    }

    /// Replace the handler for the handler's step type
    pub fn register_handler(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.step_type(), handler);
    }

    /// Remove the handler for a step type; its steps then pass through
    pub fn unregister_handler(&mut self, step_type: StepType) {
        self.handlers.remove(&step_type);
    }

    fn handler_for(&self, step_type: StepType) -> Arc<dyn StepHandler> {
        self.handlers
            .get(&step_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(PassThroughHandler::new(step_type)))
    }

    /// Number of executions currently holding a lock slot
    pub fn tracked_executions(&self) -> usize {
        self.slots.len()
    }

    /// Start a running execution of a flow
    pub async fn start(
        &self,
        flow_id: FlowId,
        user_id: UserId,
        initial_parameters: Option<JsonMap>,
    ) -> Result<Execution, CoreError> {
        self.starter
            .start(flow_id, user_id, initial_parameters, None)
            .await
    }

    /// Get an execution by ID
    pub async fn get(&self, id: &ExecutionId) -> Result<Execution, CoreError> {
        self.execution_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("execution", id.as_str()))
    }

    /// Executions of a flow, optionally narrowed to one status
    pub async fn list_by_flow(
        &self,
        flow_id: &FlowId,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<Execution>, CoreError> {
        self.execution_repo.find_by_flow(flow_id, status).await
    }

    /// Apply a partial update. Writes no log entry on the execution itself.
    ///
    /// A subflow execution entering a terminal status is recorded on its parent.
    pub async fn update(
        &self,
        id: &ExecutionId,
        patch: ExecutionPatch,
    ) -> Result<Execution, CoreError> {
        self.get(id).await?;
        let slot = self.slots.get(id);
        let updated = {
            let _guard = slot.lock.lock().await;
            self.apply_locked(id, patch).await
        };
        drop(slot);
        self.release_if_finished(id).await;

        let (execution, finished_now) = updated?;
        tracing::debug!(
            execution_id = %execution.id,
            status = %execution.status,
            "Execution updated"
        );
        if finished_now {
            self.propagate_to_parent(&execution).await;
        }

        Ok(execution)
    }

    async fn apply_locked(
        &self,
        id: &ExecutionId,
        patch: ExecutionPatch,
    ) -> Result<(Execution, bool), CoreError> {
        let mut execution = self.get(id).await?;
        let was_running = !execution.is_finished();
        execution.apply(patch)?;
        self.store(&execution).await?;
        let finished_now = was_running && execution.is_finished();
        Ok((execution, finished_now))
    }

    /// Cancel an execution, aborting any in-flight gateway call.
    ///
    /// Completed and failed executions are forced to `cancelled` and keep their
    /// finish time. Cancelling an already cancelled execution changes nothing.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<Execution, CoreError> {
        let current = self.get(id).await?;
        let slot = self.slots.get(id);
        if current.status == ExecutionStatus::Running {
            slot.cancel.send_replace(true);
        }
        let cancelled = {
            let _guard = slot.lock.lock().await;
            self.cancel_locked(id).await
        };
        drop(slot);
        self.release_if_finished(id).await;

        let (execution, was_running) = cancelled?;
        if was_running {
            self.propagate_to_parent(&execution).await;
        }

        Ok(execution)
    }

    async fn cancel_locked(&self, id: &ExecutionId) -> Result<(Execution, bool), CoreError> {
        let mut execution = self.get(id).await?;
        let previous = execution.status;
        if execution.cancel() == CancelOutcome::Cancelled {
            self.log_repo
                .append(NewLogEntry::new(
                    execution.flow_id.clone(),
                    execution.id.clone(),
                    execution.user_id.clone(),
                    LogLevel::Info,
                    "execution cancelled",
                ))
                .await?;
            self.store(&execution).await?;

            tracing::info!(
                execution_id = %execution.id,
                previous_status = %previous,
                "Execution cancelled"
            );
        }
        Ok((execution, previous == ExecutionStatus::Running))
    }

    /// Dispatch one step of an execution and log the outcome.
    ///
    /// Reference checks happen before dispatch and write no log entry.
    /// Once dispatched, success and failure are both logged before returning.
    pub async fn execute_step(
        &self,
        execution_id: &ExecutionId,
        step_id: &StepId,
        parameters: JsonMap,
    ) -> Result<Value, CoreError> {
        self.get(execution_id).await?;
        let step = self
            .step_repo
            .find_by_id(step_id)
            .await?
            .ok_or_else(|| CoreError::not_found("step", step_id.as_str()))?;

        let slot = self.slots.get(execution_id);
        let outcome = {
            let _guard = slot.lock.lock().await;
            self.dispatch_locked(&slot, execution_id, &step, parameters)
                .await
        };
        drop(slot);
        self.release_if_finished(execution_id).await;

        outcome
    }

    async fn dispatch_locked(
        &self,
        slot: &ExecutionSlot,
        execution_id: &ExecutionId,
        step: &Step,
        parameters: JsonMap,
    ) -> Result<Value, CoreError> {
        let mut execution = self.get(execution_id).await?;
        if step.flow_id != execution.flow_id {
            return Err(CoreError::ValidationError(
                "step does not belong to this execution's flow".to_string(),
            ));
        }
        if execution.is_finished() {
            return Err(CoreError::ValidationError(format!(
                "execution {} is already {}",
                execution.id, execution.status
            )));
        }

        let handler = self.handler_for(step.step_type);
        let outcome = handler
            .dispatch(StepContext {
                execution: &execution,
                step,
                parameters: &parameters,
                cancel: slot.cancel.subscribe(),
                depth: slot.depth,
            })
            .await;

        let entry = NewLogEntry::new(
            execution.flow_id.clone(),
            execution.id.clone(),
            execution.user_id.clone(),
            LogLevel::Info,
            String::new(),
        )
        .for_step(step.id.clone());

        match outcome {
            Ok(outcome) => {
                let level = result_level(&outcome.result);
                let mut details = JsonMap::new();
                details.insert("parameters".to_string(), Value::Object(parameters));
                details.insert("result".to_string(), outcome.result.clone());

                self.log_repo
                    .append(NewLogEntry {
                        level,
                        message: format!("{} executed", step.name),
                        details: Some(details),
                        ..entry
                    })
                    .await?;

                execution.apply(ExecutionPatch {
                    current_step_id: Some(step.id.clone()),
                    result: outcome.execution_result,
                    ..Default::default()
                })?;
                self.store(&execution).await?;

                tracing::info!(
                    execution_id = %execution.id,
                    step_id = %step.id,
                    step_type = %step.step_type,
                    level = %level,
                    "Step executed"
                );

                Ok(outcome.result)
            }
            Err(e) => {
                let level = failure_level(&e);
                let mut details = JsonMap::new();
                details.insert("parameters".to_string(), Value::Object(parameters));
                details.insert("error".to_string(), json!(e.to_string()));

                self.log_repo
                    .append(NewLogEntry {
                        level,
                        message: format!("{} failed", step.name),
                        details: Some(details),
                        ..entry
                    })
                    .await?;

                tracing::warn!(
                    execution_id = %execution.id,
                    step_id = %step.id,
                    step_type = %step.step_type,
                    error = %e,
                    "Step failed"
                );

                Err(e)
            }
        }
    }

    /// Record a finished subflow execution on its parent.
    ///
    /// Failures are traced and swallowed; the child's own change already stands.
    async fn propagate_to_parent(&self, child: &Execution) {
        let (Some(parent_id), Some(step_id)) = (&child.parent_execution_id, &child.parent_step_id)
        else {
            return;
        };

        let slot = self.slots.get(parent_id);
        let recorded = {
            let _guard = slot.lock.lock().await;
            self.record_subflow_locked(parent_id, step_id, child).await
        };
        drop(slot);
        self.release_if_finished(parent_id).await;

        if let Err(e) = recorded {
            tracing::warn!(
                execution_id = %child.id,
                parent_execution_id = %parent_id,
                error = %e,
                "Failed to record subflow outcome on parent"
            );
        }
    }

    async fn record_subflow_locked(
        &self,
        parent_id: &ExecutionId,
        step_id: &StepId,
        child: &Execution,
    ) -> Result<(), CoreError> {
        let mut parent = match self.execution_repo.find_by_id(parent_id).await? {
            Some(parent) if !parent.is_finished() => parent,
            _ => {
                tracing::debug!(
                    execution_id = %child.id,
                    parent_execution_id = %parent_id,
                    "Parent no longer running; subflow outcome dropped"
                );
                return Ok(());
            }
        };

        let level = match child.status {
            ExecutionStatus::Completed | ExecutionStatus::Running => LogLevel::Info,
            ExecutionStatus::Cancelled => LogLevel::Warn,
            ExecutionStatus::Failed => LogLevel::Error,
        };
        let outcome = json!({
            "step_id": step_id,
            "status": child.status,
            "result": child.result,
        });

        let mut result = parent.result.clone().unwrap_or_default();
        let mut subflows = result
            .get("subflows")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        subflows.insert(child.id.as_str().to_string(), outcome);
        result.insert("subflows".to_string(), Value::Object(subflows));

        let mut details = JsonMap::new();
        details.insert("execution_id".to_string(), json!(child.id));
        details.insert("status".to_string(), json!(child.status));
        details.insert("result".to_string(), json!(child.result));
        self.log_repo
            .append(
                NewLogEntry::new(
                    parent.flow_id.clone(),
                    parent.id.clone(),
                    parent.user_id.clone(),
                    level,
                    format!("subflow {}", child.status),
                )
                .for_step(step_id.clone())
                .with_details(details),
            )
            .await?;

        parent.apply(ExecutionPatch {
            result: Some(result),
            ..Default::default()
        })?;
        self.store(&parent).await?;

        tracing::info!(
            execution_id = %parent.id,
            subflow_execution_id = %child.id,
            status = %child.status,
            "Subflow outcome recorded"
        );

        Ok(())
    }

    /// Drop the slot once its execution is finished or gone
    async fn release_if_finished(&self, id: &ExecutionId) {
        match self.execution_repo.find_by_id(id).await {
            Ok(Some(execution)) if !execution.is_finished() => {}
            _ => self.slots.release_if_idle(id),
        }
    }

    async fn store(&self, execution: &Execution) -> Result<(), CoreError> {
        if !self.execution_repo.update(execution).await? {
            return Err(CoreError::not_found("execution", execution.id.as_str()));
        }
        Ok(())
    }
}

/// `error` when the result carries a non-success status, directly or under `result`
fn result_level(result: &Value) -> LogLevel {
    let success = json!("success");
    let nested = result.get("result").and_then(|inner| inner.get("status"));
    match (result.get("status"), nested) {
        (Some(status), _) if *status != success => LogLevel::Error,
        (_, Some(status)) if *status != success => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

fn failure_level(error: &CoreError) -> LogLevel {
    match (error, error.kind()) {
        (CoreError::Cancelled(_), _) => LogLevel::Warn,
        (_, ErrorKind::Validation) => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}
