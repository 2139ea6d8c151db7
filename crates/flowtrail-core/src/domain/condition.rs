//! Condition and path evaluation over JSON contexts

use crate::CoreError;
use serde_json::Value;

/// Trait for evaluating branch conditions
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate the condition within the given context
    fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, CoreError>;
}

/// Condition evaluator using JMESPath truthiness
#[derive(Debug, Clone, Copy, Default)]
pub struct JmesPathConditionEvaluator;

impl ConditionEvaluator for JmesPathConditionEvaluator {
    fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, CoreError> {
        let compiled = compile(expression)?;
        let result = compiled.search(context).map_err(|e| {
            CoreError::ExpressionError(format!(
                "Failed to evaluate JMESPath expression: {}: {}",
                expression, e
            ))
        })?;
        Ok(result.is_truthy())
    }
}

/// Evaluate a JMESPath expression and convert the match back to JSON.
///
/// A path that selects nothing yields `Value::Null`.
pub fn search_path(expression: &str, context: &Value) -> Result<Value, CoreError> {
    let compiled = compile(expression)?;
    let result = compiled.search(context).map_err(|e| {
        CoreError::ExpressionError(format!(
            "Failed to evaluate JMESPath expression: {}: {}",
            expression, e
        ))
    })?;
    Ok(serde_json::to_value(&*result)?)
}

fn compile(expression: &str) -> Result<jmespath::Expression<'static>, CoreError> {
    jmespath::compile(expression).map_err(|e| {
        CoreError::ExpressionError(format!(
            "Failed to compile JMESPath expression: {}: {}",
            expression, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "parameters": {
                "order_id": "42",
                "amount": 150,
                "express": false,
                "items": [1, 2, 3]
            },
            "execution": {
                "initial_parameters": {"region": "eu"},
                "current_step_id": null
            }
        })
    }

    #[test]
    fn test_truthy_and_falsy_paths() {
        let evaluator = JmesPathConditionEvaluator;
        let ctx = context();

        assert!(evaluator.evaluate("parameters.order_id", &ctx).unwrap());
        assert!(evaluator.evaluate("parameters.amount > `100`", &ctx).unwrap());
        assert!(!evaluator.evaluate("parameters.express", &ctx).unwrap());
        assert!(!evaluator.evaluate("parameters.missing", &ctx).unwrap());
        assert!(evaluator
            .evaluate("execution.initial_parameters.region == 'eu'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_invalid_expression_is_an_expression_error() {
        let err = JmesPathConditionEvaluator
            .evaluate("parameters.[", &context())
            .unwrap_err();
        assert!(matches!(err, CoreError::ExpressionError(_)));
    }

    #[test]
    fn test_search_path_returns_json() {
        let ctx = context();
        assert_eq!(search_path("parameters.items", &ctx).unwrap(), json!([1, 2, 3]));
        assert_eq!(search_path("parameters.nothing", &ctx).unwrap(), Value::Null);
    }
}
