//! Flow and step fixtures.

use flowtrail_core::{json_map, FlowId, JsonMap, NewFlow, NewStep, StepType};
use serde_json::json;

/// The "Order Flow" definition used by the end-to-end suites.
pub fn order_flow() -> NewFlow {
    NewFlow::new(
        "Order Flow",
        json!({
            "nodes": [
                {"id": "fetch", "type": "remote-call"},
                {"id": "check", "type": "condition"},
                {"id": "notify", "type": "output"}
            ],
            "edges": [
                {"from": "fetch", "to": "check"},
                {"from": "check", "to": "notify"}
            ]
        }),
    )
    .with_description("Fetches an order and reports its state")
}

/// A flow with an empty definition.
pub fn empty_flow(name: &str) -> NewFlow {
    NewFlow::new(name, json!({"nodes": [], "edges": []}))
}

/// A remote-call step invoking `function_name`.
pub fn remote_call_step(flow_id: &FlowId, name: &str, function_name: &str) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::RemoteCall)
        .with_config(json_map(json!({"function_name": function_name})))
}

/// A condition step branching on a JMESPath expression.
pub fn condition_step(
    flow_id: &FlowId,
    name: &str,
    expression: &str,
    true_next: &str,
    false_next: &str,
) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::Condition).with_config(json_map(json!({
        "expression": expression,
        "true_next": true_next,
        "false_next": false_next,
    })))
}

/// A loop step over the array `items` resolves to.
pub fn loop_step(flow_id: &FlowId, name: &str, items: &str, body: &str) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::Loop)
        .with_config(json_map(json!({"items": items, "body": body})))
}

/// An input step requiring the named parameters.
pub fn input_step(flow_id: &FlowId, name: &str, required: &[&str]) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::Input)
        .with_config(json_map(json!({"required": required})))
}

/// An output step projecting the named parameters.
pub fn output_step(flow_id: &FlowId, name: &str, fields: &[&str]) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::Output)
        .with_config(json_map(json!({"fields": fields})))
}

/// A subflow step starting `child`.
pub fn subflow_step(flow_id: &FlowId, name: &str, child: &FlowId) -> NewStep {
    NewStep::new(flow_id.clone(), name, StepType::Subflow)
        .with_config(json_map(json!({"flow_id": child})))
}

/// Parameters for a single order lookup.
pub fn order_parameters(order_id: &str) -> JsonMap {
    json_map(json!({"order_id": order_id}))
}
