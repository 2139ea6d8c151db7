//! Order Flow driven end to end through the registry, engine and log store.

use anyhow::Result;
use flowtrail_core::{
    json_map, CoreError, ExecutionPatch, ExecutionStatus, LogLevel, LogQuery, UserId,
};
use flowtrail_test_utils::assertions::{
    assert_finished_with, assert_levels, assert_messages, assert_newest_first,
};
use flowtrail_test_utils::data_generators::{
    condition_step, input_step, order_flow, order_parameters, output_step, remote_call_step,
};
use flowtrail_test_utils::TestHarness;
use serde_json::json;

#[tokio::test]
async fn order_flow_fetch_then_cancel() -> Result<()> {
    let harness = TestHarness::new();
    let (flow, s1) = harness.seed_order_flow().await?;

    let execution = harness
        .engine
        .start(flow.id.clone(), UserId::from("u1"), None)
        .await?;
    assert_eq!(execution.status, ExecutionStatus::Running);

    let result = harness
        .engine
        .execute_step(&execution.id, &s1.id, order_parameters("42"))
        .await?;
    assert_eq!(result["function_name"], json!("GET_ORDER"));
    assert_eq!(result["result"]["status"], json!("success"));
    assert_eq!(harness.gateway.call_count("GET_ORDER"), 1);
    assert_eq!(harness.gateway.calls()[0].parameters, order_parameters("42"));

    let step_entries = harness
        .logs
        .search(LogQuery {
            step_id: Some(s1.id.clone()),
            ..LogQuery::for_execution(execution.id.clone())
        })
        .await?;
    assert_eq!(step_entries.len(), 1);
    assert_eq!(step_entries[0].level, LogLevel::Info);

    let cancelled = harness.engine.cancel(&execution.id).await?;
    assert_finished_with(&cancelled, ExecutionStatus::Cancelled)?;

    let entries = harness
        .logs
        .search(LogQuery::for_execution(execution.id.clone()))
        .await?;
    assert_newest_first(&entries)?;
    assert_messages(
        &entries,
        &["execution cancelled", "Fetch order executed", "execution started"],
    )?;
    assert_levels(&entries, &[LogLevel::Info, LogLevel::Info, LogLevel::Info])?;
    assert_eq!(entries[1].step_id, Some(s1.id.clone()));
    assert!(entries.iter().all(|e| e.user_id == UserId::from("u1")));

    Ok(())
}

#[tokio::test]
async fn order_flow_runs_to_completion() -> Result<()> {
    let harness = TestHarness::new();
    let flow = harness.registry.create_flow(order_flow()).await?;
    let flow = harness.registry.publish(&flow.id).await?;

    let read = harness
        .registry
        .create_step(input_step(&flow.id, "Read order", &["order_id"]))
        .await?;
    let fetch = harness
        .registry
        .create_step(remote_call_step(&flow.id, "Fetch order", "GET_ORDER"))
        .await?;
    let check = harness
        .registry
        .create_step(condition_step(
            &flow.id,
            "Order found?",
            "parameters.found",
            "report",
            "abort",
        ))
        .await?;
    let report = harness
        .registry
        .create_step(output_step(&flow.id, "Report", &["order_id", "state"]))
        .await?;

    let execution = harness
        .engine
        .start(flow.id.clone(), UserId::from("u1"), Some(order_parameters("42")))
        .await?;

    harness
        .engine
        .execute_step(&execution.id, &read.id, order_parameters("42"))
        .await?;
    harness
        .engine
        .execute_step(&execution.id, &fetch.id, order_parameters("42"))
        .await?;
    let branch = harness
        .engine
        .execute_step(
            &execution.id,
            &check.id,
            json_map(json!({"found": true})),
        )
        .await?;
    assert_eq!(branch["next_step"], json!("report"));

    harness
        .engine
        .execute_step(
            &execution.id,
            &report.id,
            json_map(json!({"order_id": "42", "state": "shipped", "secret": 1})),
        )
        .await?;

    let finished = harness
        .engine
        .update(&execution.id, ExecutionPatch::status(ExecutionStatus::Completed))
        .await?;
    assert_finished_with(&finished, ExecutionStatus::Completed)?;
    assert_eq!(finished.current_step_id, Some(report.id.clone()));
    assert_eq!(
        finished.result,
        Some(json_map(json!({"order_id": "42", "state": "shipped"})))
    );

    let entries = harness.logs.for_execution(&execution.id).await?;
    assert_messages(
        &entries,
        &[
            "execution started",
            "Read order executed",
            "Fetch order executed",
            "Order found? executed",
            "Report executed",
        ],
    )?;

    // a late cancel overrides the outcome but keeps the finish time and result
    let cancelled = harness.engine.cancel(&execution.id).await?;
    assert_finished_with(&cancelled, ExecutionStatus::Cancelled)?;
    assert_eq!(cancelled.finished_at, finished.finished_at);
    assert_eq!(cancelled.result, finished.result);
    let entries = harness.logs.for_execution(&execution.id).await?;
    assert_eq!(entries.last().map(|e| e.message.as_str()), Some("execution cancelled"));

    Ok(())
}

#[tokio::test]
async fn order_flow_records_gateway_failure() -> Result<()> {
    let harness = TestHarness::new();
    let (flow, s1) = harness.seed_order_flow().await?;
    harness
        .gateway
        .fail_times("GET_ORDER", 1, CoreError::GatewayError("order service down".into()));

    let execution = harness
        .engine
        .start(flow.id.clone(), UserId::from("u1"), None)
        .await?;

    let err = harness
        .engine
        .execute_step(&execution.id, &s1.id, order_parameters("42"))
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::GatewayError("order service down".into()));

    // the script is exhausted, so the retry by the caller succeeds
    harness
        .engine
        .execute_step(&execution.id, &s1.id, order_parameters("42"))
        .await?;

    let errors = harness
        .logs
        .recent_errors(LogQuery::for_execution(execution.id.clone()), 10)
        .await?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Fetch order failed");
    assert_eq!(
        errors[0].details.as_ref().map(|d| d["error"].clone()),
        Some(json!("Gateway error: order service down"))
    );

    let stats = harness
        .logs
        .stats(&LogQuery::for_flow(flow.id.clone()))
        .await?;
    assert_eq!((stats.total, stats.info, stats.error), (3, 2, 1));

    harness.registry.delete_flow(&flow.id).await?;
    assert!(harness.engine.get(&execution.id).await.is_err());

    Ok(())
}
