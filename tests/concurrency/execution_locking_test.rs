//! Operations on one execution serialize; distinct executions overlap.

use anyhow::Result;
use flowtrail_core::{EngineConfig, ExecutionPatch, ExecutionStatus, UserId};
use flowtrail_test_utils::data_generators::order_parameters;
use flowtrail_test_utils::{StubGateway, TestHarness};
use std::time::Duration;
use tokio::time::Instant;

const CALL_DELAY: Duration = Duration::from_millis(50);

fn slow_harness() -> TestHarness {
    TestHarness::with_gateway(
        StubGateway::new().with_delay(CALL_DELAY),
        EngineConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn steps_of_one_execution_run_one_at_a_time() -> Result<()> {
    let harness = slow_harness();
    let (flow, step) = harness.seed_order_flow().await?;
    let execution = harness
        .engine
        .start(flow.id.clone(), UserId::from("u1"), None)
        .await?;

    let started = Instant::now();
    let (first, second) = tokio::join!(
        harness
            .engine
            .execute_step(&execution.id, &step.id, order_parameters("1")),
        harness
            .engine
            .execute_step(&execution.id, &step.id, order_parameters("2")),
    );
    first?;
    second?;

    assert!(started.elapsed() >= CALL_DELAY * 2);
    assert_eq!(harness.gateway.call_count("GET_ORDER"), 2);
    assert_eq!(harness.logs.for_execution(&execution.id).await?.len(), 3);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn distinct_executions_overlap() -> Result<()> {
    let harness = slow_harness();
    let (flow, step) = harness.seed_order_flow().await?;
    let mut executions = Vec::new();
    for _ in 0..4 {
        executions.push(
            harness
                .engine
                .start(flow.id.clone(), UserId::from("u1"), None)
                .await?,
        );
    }

    let started = Instant::now();
    let results = futures::future::join_all(executions.iter().map(|execution| {
        harness
            .engine
            .execute_step(&execution.id, &step.id, order_parameters("42"))
    }))
    .await;
    for result in results {
        result?;
    }

    assert!(started.elapsed() < CALL_DELAY * 2);
    assert_eq!(harness.gateway.call_count("GET_ORDER"), 4);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn update_waits_for_in_flight_step() -> Result<()> {
    let harness = slow_harness();
    let (flow, step) = harness.seed_order_flow().await?;
    let execution = harness
        .engine
        .start(flow.id.clone(), UserId::from("u1"), None)
        .await?;

    let (executed, updated) = tokio::join!(
        harness
            .engine
            .execute_step(&execution.id, &step.id, order_parameters("42")),
        async {
            harness.gateway.wait_for_calls(1).await;
            harness
                .engine
                .update(&execution.id, ExecutionPatch::status(ExecutionStatus::Completed))
                .await
        },
    );
    executed?;
    let updated = updated?;

    assert_eq!(updated.status, ExecutionStatus::Completed);
    assert_eq!(updated.current_step_id, Some(step.id.clone()));
    assert!(updated.finished_at.is_some());

    Ok(())
}
