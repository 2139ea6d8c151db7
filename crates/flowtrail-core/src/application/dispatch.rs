//! Step dispatch
//!
//! Each [`StepType`] maps to one [`StepHandler`], selected by the engine from
//! a table built at construction time.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::execution_engine::{ExecutionStarter, ParentLink};
use crate::domain::condition::{search_path, ConditionEvaluator};
use crate::domain::execution::Execution;
use crate::domain::ids::FlowId;
use crate::domain::step::{Step, StepType};
use crate::gateway::{RemoteCallGateway, RetryPolicy};
use crate::types::{str_field, JsonMap};
use crate::CoreError;

/// Everything a handler may look at while dispatching one step
pub struct StepContext<'a> {
    /// Execution the step runs in; still `running`
    pub execution: &'a Execution,
    /// Step being dispatched
    pub step: &'a Step,
    /// Caller-supplied parameters
    pub parameters: &'a JsonMap,
    /// Flips to `true` when the execution is cancelled
    pub cancel: watch::Receiver<bool>,
    /// Nesting depth of the execution; 0 for top-level executions
    pub depth: usize,
}

impl StepContext<'_> {
    /// Document that condition and loop expressions are evaluated against
    pub fn evaluation_context(&self) -> Value {
        json!({
            "parameters": self.parameters,
            "execution": {
                "initial_parameters": self.execution.initial_parameters,
                "current_step_id": self.execution.current_step_id,
            }
        })
    }
}

/// What a handler produced
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Result returned to the caller and recorded in the log
    pub result: Value,
    /// Replacement for the execution's `result`, if the step sets one
    pub execution_result: Option<JsonMap>,
}

impl StepOutcome {
    /// Outcome that leaves the execution result alone
    pub fn new(result: Value) -> Self {
        Self {
            result,
            execution_result: None,
        }
    }
}

/// Dispatch capability for one step type
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Step type this handler serves
    fn step_type(&self) -> StepType;

    /// Run the step
    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError>;
}

/// Delegates to the remote-call gateway, bounded by a timeout and the cancel signal
pub struct RemoteCallHandler {
    gateway: Arc<dyn RemoteCallGateway>,
    retry_policy: Arc<dyn RetryPolicy>,
    timeout: Duration,
    validate_before_call: bool,
}

impl RemoteCallHandler {
    /// Create a remote-call handler
    pub fn new(
        gateway: Arc<dyn RemoteCallGateway>,
        retry_policy: Arc<dyn RetryPolicy>,
        timeout: Duration,
        validate_before_call: bool,
    ) -> Self {
        Self {
            gateway,
            retry_policy,
            timeout,
            validate_before_call,
        }
    }

    async fn call_once(
        &self,
        function_name: &str,
        parameters: &JsonMap,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Value, CoreError> {
        tokio::select! {
            biased;
            _ = wait_for_cancel(cancel) => Err(CoreError::Cancelled(format!(
                "call to {} aborted",
                function_name
            ))),
            outcome = tokio::time::timeout(self.timeout, self.gateway.call(function_name, parameters)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::GatewayTimeout(format!(
                        "{} did not answer within {}ms",
                        function_name,
                        self.timeout.as_millis()
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl StepHandler for RemoteCallHandler {
    fn step_type(&self) -> StepType {
        StepType::RemoteCall
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let function_name = str_field(&ctx.step.config, "function_name").ok_or_else(|| {
            CoreError::ValidationError("missing remote function name".to_string())
        })?;
        let mut cancel = ctx.cancel.clone();

        if self.validate_before_call {
            let report = self.gateway.validate(function_name, ctx.parameters).await?;
            if !report.valid {
                return Err(CoreError::ValidationError(format!(
                    "parameters rejected by {}: {}",
                    function_name,
                    report.errors.join("; ")
                )));
            }
        }

        let mut attempt = 1;
        loop {
            match self.call_once(function_name, ctx.parameters, &mut cancel).await {
                Ok(result) => return Ok(StepOutcome::new(result)),
                Err(e) => {
                    let Some(delay) = self.retry_policy.next_delay(attempt, &e) else {
                        return Err(e);
                    };
                    tracing::warn!(
                        execution_id = %ctx.execution.id,
                        function_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = wait_for_cancel(&mut cancel) => {
                            return Err(CoreError::Cancelled(format!(
                                "retry of {} aborted",
                                function_name
                            )));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Resolves once the cancel flag is set; never resolves if the sender is gone
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Picks `true_next` or `false_next` from a JMESPath predicate
pub struct ConditionHandler {
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl ConditionHandler {
    /// Create a condition handler
    pub fn new(evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl StepHandler for ConditionHandler {
    fn step_type(&self) -> StepType {
        StepType::Condition
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let config = &ctx.step.config;
        // No expression: always the true branch
        let outcome = match str_field(config, "expression") {
            Some(expression) => self
                .evaluator
                .evaluate(expression, &ctx.evaluation_context())?,
            None => true,
        };
        let branch = if outcome { "true_next" } else { "false_next" };
        let next_step = config.get(branch).cloned().unwrap_or(Value::Null);

        Ok(StepOutcome::new(json!({
            "type": StepType::Condition.as_str(),
            "result": outcome,
            "next_step": next_step,
        })))
    }
}

/// Resolves a bounded item list for the loop body
pub struct LoopHandler {
    max_iterations: usize,
}

impl LoopHandler {
    /// Create a loop handler with an engine-wide iteration cap
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

#[async_trait]
impl StepHandler for LoopHandler {
    fn step_type(&self) -> StepType {
        StepType::Loop
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let config = &ctx.step.config;
        let expression = str_field(config, "items").unwrap_or("parameters.items");
        let items = match search_path(expression, &ctx.evaluation_context())? {
            Value::Array(items) => items,
            other => {
                return Err(CoreError::ValidationError(format!(
                    "loop items `{}` resolved to {} instead of an array",
                    expression,
                    json_type(&other)
                )))
            }
        };

        let bound = match config.get("max_iterations") {
            None => self.max_iterations,
            Some(value) => value
                .as_u64()
                .map(|n| (n as usize).min(self.max_iterations))
                .ok_or_else(|| {
                    CoreError::ValidationError(
                        "max_iterations must be a non-negative integer".to_string(),
                    )
                })?,
        };

        let truncated = items.len() > bound;
        let items: Vec<Value> = items.into_iter().take(bound).collect();

        Ok(StepOutcome::new(json!({
            "type": StepType::Loop.as_str(),
            "result": "success",
            "iterations": items.len(),
            "items": items,
            "next_step": config.get("body").cloned().unwrap_or(Value::Null),
            "truncated": truncated,
        })))
    }
}

/// Checks that required parameters are bound
#[derive(Debug, Default)]
pub struct InputHandler;

#[async_trait]
impl StepHandler for InputHandler {
    fn step_type(&self) -> StepType {
        StepType::Input
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let required = name_list(&ctx.step.config, "required")?;
        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|name| !ctx.parameters.contains_key(*name))
            .collect();

        if !missing.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "missing required input: {}",
                missing.join(", ")
            )));
        }

        Ok(StepOutcome::new(json!({
            "type": StepType::Input.as_str(),
            "result": "success",
            "bound": ctx.parameters,
        })))
    }
}

/// Projects parameters into the execution result
#[derive(Debug, Default)]
pub struct OutputHandler;

#[async_trait]
impl StepHandler for OutputHandler {
    fn step_type(&self) -> StepType {
        StepType::Output
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let output: JsonMap = if ctx.step.config.contains_key("fields") {
            name_list(&ctx.step.config, "fields")?
                .into_iter()
                .filter_map(|name| ctx.parameters.get(&name).map(|v| (name, v.clone())))
                .collect()
        } else {
            ctx.parameters.clone()
        };

        Ok(StepOutcome {
            result: json!({
                "type": StepType::Output.as_str(),
                "result": "success",
                "output": output,
            }),
            execution_result: Some(output),
        })
    }
}

/// Starts a nested execution of another flow
pub struct SubflowHandler {
    starter: Arc<ExecutionStarter>,
    max_depth: usize,
}

impl SubflowHandler {
    /// Create a subflow handler
    pub fn new(starter: Arc<ExecutionStarter>, max_depth: usize) -> Self {
        Self { starter, max_depth }
    }
}

#[async_trait]
impl StepHandler for SubflowHandler {
    fn step_type(&self) -> StepType {
        StepType::Subflow
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        let flow_id = str_field(&ctx.step.config, "flow_id")
            .map(FlowId::from)
            .ok_or_else(|| CoreError::ValidationError("missing subflow flow_id".to_string()))?;

        let depth = ctx.depth + 1;
        if depth > self.max_depth {
            return Err(CoreError::ValidationError(format!(
                "subflow depth limit of {} reached",
                self.max_depth
            )));
        }

        let child = self
            .starter
            .start(
                flow_id,
                ctx.execution.user_id.clone(),
                Some(ctx.parameters.clone()),
                Some(ParentLink {
                    execution_id: ctx.execution.id.clone(),
                    step_id: ctx.step.id.clone(),
                    depth,
                }),
            )
            .await?;

        Ok(StepOutcome::new(json!({
            "type": StepType::Subflow.as_str(),
            "result": "success",
            "execution_id": child.id,
            "flow_id": child.flow_id,
        })))
    }
}

/// Fallback for step types without a registered handler
#[derive(Debug)]
pub struct PassThroughHandler {
    step_type: StepType,
}

impl PassThroughHandler {
    /// Create a pass-through handler for a step type
    pub fn new(step_type: StepType) -> Self {
        Self { step_type }
    }
}

#[async_trait]
impl StepHandler for PassThroughHandler {
    fn step_type(&self) -> StepType {
        self.step_type
    }

    async fn dispatch(&self, ctx: StepContext<'_>) -> Result<StepOutcome, CoreError> {
        Ok(StepOutcome::new(json!({
            "type": ctx.step.step_type.as_str(),
            "result": "success",
            "message": format!("{} executed", ctx.step.name),
        })))
    }
}

fn name_list(config: &JsonMap, key: &str) -> Result<Vec<String>, CoreError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    CoreError::ValidationError(format!("{} must contain only strings", key))
                })
            })
            .collect(),
        Some(_) => Err(CoreError::ValidationError(format!(
            "{} must be an array of names",
            key
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
