use crate::InMemoryStateStoreProvider;
use flowtrail_core::{
    json_map, CoreError, Execution, ExecutionId, ExecutionPatch, ExecutionStatus, Flow, FlowId,
    LogLevel, LogQuery, NewFlow, NewLogEntry, NewStep, Step, StepType, UserId, MAX_SEARCH_LIMIT,
};
use serde_json::json;

fn entry(flow: &str, execution: &str, level: LogLevel, message: &str) -> NewLogEntry {
    NewLogEntry::new(
        FlowId::from(flow),
        ExecutionId::from(execution),
        UserId::from("u1"),
        level,
        message,
    )
}

#[tokio::test]
async fn test_flow_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (flow_repo, _, _, _) = provider.create_repositories();

    let flow = Flow::new(NewFlow::new("Order Flow", json!({"nodes": []})));
    flow_repo.save(&flow).await?;

    let found = flow_repo.find_by_id(&flow.id).await?;
    assert_eq!(found.as_ref().map(|f| f.name.as_str()), Some("Order Flow"));
    assert_eq!(flow_repo.find_all().await?.len(), 1);

    let mut renamed = flow.clone();
    renamed.name = "Renamed".to_string();
    assert!(flow_repo.update(&renamed).await?);
    assert_eq!(
        flow_repo.find_by_id(&flow.id).await?.map(|f| f.name),
        Some("Renamed".to_string())
    );

    assert!(flow_repo.delete(&flow.id).await?);
    assert!(!flow_repo.delete(&flow.id).await?);
    assert!(flow_repo.find_by_id(&flow.id).await?.is_none());

    // update never resurrects a deleted flow
    assert!(!flow_repo.update(&renamed).await?);
    assert!(flow_repo.find_by_id(&flow.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_step_repository_indexes_by_flow() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, step_repo, _, _) = provider.create_repositories();

    let f1 = FlowId::from("f1");
    let f2 = FlowId::from("f2");
    let a = Step::new(NewStep::new(f1.clone(), "a", StepType::Input));
    let b = Step::new(NewStep::new(f1.clone(), "b", StepType::Output));
    let c = Step::new(NewStep::new(f2.clone(), "c", StepType::Loop));
    for step in [&a, &b, &c] {
        step_repo.save(step).await?;
    }

    let mut names: Vec<String> = step_repo
        .find_by_flow(&f1)
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    assert!(step_repo.delete(&a.id).await?);
    assert_eq!(step_repo.find_by_flow(&f1).await?.len(), 1);
    assert!(!step_repo.update(&a).await?);
    assert!(step_repo.find_by_id(&a.id).await?.is_none());
    assert!(step_repo.update(&b).await?);

    assert_eq!(step_repo.delete_by_flow(&f1).await?, 1);
    assert!(step_repo.find_by_flow(&f1).await?.is_empty());
    assert!(step_repo.find_by_id(&b.id).await?.is_none());
    assert_eq!(step_repo.find_by_flow(&f2).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_execution_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, execution_repo, _) = provider.create_repositories();

    let flow_id = FlowId::from("f1");
    let running = Execution::new(flow_id.clone(), UserId::from("u1"), None);
    let mut done = Execution::new(flow_id.clone(), UserId::from("u2"), None);
    done.apply(ExecutionPatch::status(ExecutionStatus::Completed))?;
    execution_repo.save(&running).await?;
    execution_repo.save(&done).await?;

    assert_eq!(execution_repo.find_by_flow(&flow_id, None).await?.len(), 2);
    let completed = execution_repo
        .find_by_flow(&flow_id, Some(ExecutionStatus::Completed))
        .await?;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done.id);

    let removed = execution_repo.delete_by_flow(&flow_id).await?;
    assert_eq!(removed.len(), 2);
    assert!(execution_repo.find_by_id(&running.id).await?.is_none());

    // update never resurrects a deleted execution
    assert!(!execution_repo.update(&running).await?);
    assert!(execution_repo.find_by_id(&running.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_log_search_is_newest_first_and_conjunctive() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, _, log_repo) = provider.create_repositories();

    log_repo.append(entry("f1", "e1", LogLevel::Info, "execution started")).await?;
    log_repo.append(entry("f1", "e1", LogLevel::Error, "Fetch order failed")).await?;
    log_repo.append(entry("f1", "e2", LogLevel::Info, "execution started")).await?;
    log_repo.append(entry("f2", "e3", LogLevel::Error, "Other failed")).await?;

    let e1 = log_repo
        .search(&LogQuery::for_execution(ExecutionId::from("e1")))
        .await?;
    assert_eq!(e1.len(), 2);
    assert_eq!(e1[0].message, "Fetch order failed");
    assert!(e1[0].timestamp >= e1[1].timestamp);

    let errors_in_f1 = log_repo
        .search(&LogQuery::for_flow(FlowId::from("f1")).with_level(LogLevel::Error))
        .await?;
    assert_eq!(errors_in_f1.len(), 1);

    let by_message = log_repo
        .search(&LogQuery {
            message: Some("STARTED".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(by_message.len(), 2);
    assert_eq!(by_message[0].execution_id, ExecutionId::from("e2"));

    let unknown = log_repo
        .search(&LogQuery::for_execution(ExecutionId::from("nope")))
        .await?;
    assert!(unknown.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_log_search_skip_and_limit() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, _, log_repo) = provider.create_repositories();

    for i in 0..1100 {
        log_repo
            .append(entry("f1", "e1", LogLevel::Info, &format!("event {}", i)))
            .await?;
    }

    let default = log_repo.search(&LogQuery::default()).await?;
    assert_eq!(default.len(), 100);

    let capped = log_repo
        .search(&LogQuery::default().with_limit(5000))
        .await?;
    assert_eq!(capped.len(), MAX_SEARCH_LIMIT);

    let page = log_repo
        .search(&LogQuery {
            skip: 2,
            limit: Some(3),
            ..Default::default()
        })
        .await?;
    let messages: Vec<&str> = page.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["event 1097", "event 1096", "event 1095"]);

    Ok(())
}

#[tokio::test]
async fn test_log_stats_and_delete() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, _, _, log_repo) = provider.create_repositories();

    let empty = log_repo.stats(&LogQuery::default()).await?;
    assert_eq!(empty.total, 0);
    assert_eq!(empty.error_rate, 0.0);

    let first = log_repo
        .append(
            entry("f1", "e1", LogLevel::Info, "execution started")
                .with_details(json_map(json!({"initial_parameters": null}))),
        )
        .await?;
    log_repo.append(entry("f1", "e1", LogLevel::Warn, "slow")).await?;
    log_repo.append(entry("f1", "e1", LogLevel::Error, "failed")).await?;
    log_repo.append(entry("f1", "e1", LogLevel::Error, "failed again")).await?;

    let stats = log_repo
        .stats(&LogQuery::for_execution(ExecutionId::from("e1")))
        .await?;
    assert_eq!((stats.total, stats.info, stats.warn, stats.error), (4, 1, 1, 2));
    assert!((stats.error_rate - 0.5).abs() < f64::EPSILON);

    assert_eq!(log_repo.find_by_id(&first.id).await?, Some(first.clone()));
    assert!(log_repo.delete(&first.id).await?);
    assert!(!log_repo.delete(&first.id).await?);
    assert!(log_repo.find_by_id(&first.id).await?.is_none());
    assert_eq!(
        log_repo
            .find_by_execution(&ExecutionId::from("e1"))
            .await?
            .len(),
        3
    );

    Ok(())
}
