//! Shared wiring for the core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use flowtrail_core::{
    CoreError, EngineConfig, ExecutionEngine, Flow, FlowId, FlowRegistry, FlowRepository,
    JsonMap, LogService, RemoteCallGateway, ValidationReport,
};
use flowtrail_state_inmemory::InMemoryStateStoreProvider;
use mockall::mock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

mock! {
    pub Gateway {}

    #[async_trait]
    impl RemoteCallGateway for Gateway {
        async fn call(&self, function_name: &str, parameters: &JsonMap) -> Result<Value, CoreError>;
        async fn validate(&self, function_name: &str, parameters: &JsonMap) -> Result<ValidationReport, CoreError>;
    }
}

/// Gateway that echoes a success document
pub struct EchoGateway;

#[async_trait]
impl RemoteCallGateway for EchoGateway {
    async fn call(&self, function_name: &str, parameters: &JsonMap) -> Result<Value, CoreError> {
        Ok(json!({
            "function_name": function_name,
            "parameters": parameters,
            "result": {"status": "success", "data": {}},
        }))
    }
}

/// Gateway whose calls never answer; signals when a call arrives
#[derive(Default)]
pub struct HangingGateway {
    pub started: Notify,
}

#[async_trait]
impl RemoteCallGateway for HangingGateway {
    async fn call(&self, _function_name: &str, _parameters: &JsonMap) -> Result<Value, CoreError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

/// Flow repository that can hold the next lookup after it has read the flow
pub struct GatedFlowRepository {
    inner: Arc<dyn FlowRepository>,
    armed: AtomicBool,
    /// Signalled once a lookup is held
    pub parked: Notify,
    /// Lets the held lookup return
    pub release: Notify,
}

impl GatedFlowRepository {
    pub fn new(inner: Arc<dyn FlowRepository>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            parked: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Hold the next `find_by_id` until `release` is notified
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlowRepository for GatedFlowRepository {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<Flow>, CoreError> {
        let found = self.inner.find_by_id(id).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        Ok(found)
    }

    async fn save(&self, flow: &Flow) -> Result<(), CoreError> {
        self.inner.save(flow).await
    }

    async fn update(&self, flow: &Flow) -> Result<bool, CoreError> {
        self.inner.update(flow).await
    }

    async fn delete(&self, id: &FlowId) -> Result<bool, CoreError> {
        self.inner.delete(id).await
    }

    async fn find_all(&self) -> Result<Vec<Flow>, CoreError> {
        self.inner.find_all().await
    }
}

pub struct Services {
    pub registry: FlowRegistry,
    pub engine: ExecutionEngine,
    pub logs: LogService,
}

/// Route engine tracing output through the test harness; repeated calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn services(gateway: Arc<dyn RemoteCallGateway>, config: EngineConfig) -> Services {
    init_tracing();
    let provider = InMemoryStateStoreProvider::new();
    let (flow_repo, step_repo, execution_repo, log_repo) = provider.create_repositories();

    let registry = FlowRegistry::new(flow_repo, step_repo, execution_repo);
    let engine = ExecutionEngine::new(&registry, log_repo.clone(), gateway, &config);

    Services {
        registry,
        engine,
        logs: LogService::new(log_repo, &config),
    }
}

/// Echo services whose flow lookups go through a [`GatedFlowRepository`]
pub fn gated_services() -> (Arc<Services>, Arc<GatedFlowRepository>) {
    init_tracing();
    let config = EngineConfig::default();
    let provider = InMemoryStateStoreProvider::new();
    let (flow_repo, step_repo, execution_repo, log_repo) = provider.create_repositories();
    let gate = Arc::new(GatedFlowRepository::new(flow_repo));

    let registry = FlowRegistry::new(gate.clone(), step_repo, execution_repo);
    let engine = ExecutionEngine::new(&registry, log_repo.clone(), Arc::new(EchoGateway), &config);
    let services = Services {
        registry,
        engine,
        logs: LogService::new(log_repo, &config),
    };
    (Arc::new(services), gate)
}

pub fn echo_services() -> Services {
    services(Arc::new(EchoGateway), EngineConfig::default())
}
