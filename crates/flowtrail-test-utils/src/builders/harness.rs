//! Test harness over the in-memory state store.

use flowtrail_core::{
    CoreError, EngineConfig, ExecutionEngine, Flow, FlowRegistry, LogService, RemoteCallGateway, Step,
};
use flowtrail_monitoring::init_test_tracing;
use flowtrail_state_inmemory::InMemoryStateStoreProvider;
use std::sync::Arc;

use crate::data_generators::{order_flow, remote_call_step};
use crate::implementations::StubGateway;

/// Registry, engine and log service sharing one in-memory store.
pub struct TestHarness<G: RemoteCallGateway + 'static = StubGateway> {
    /// Flow and step management
    pub registry: FlowRegistry,
    /// Execution lifecycle and step dispatch
    pub engine: ExecutionEngine,
    /// Log queries
    pub logs: LogService,
    /// Gateway the engine calls
    pub gateway: Arc<G>,
    /// Configuration the engine was built with
    pub config: EngineConfig,
}

impl TestHarness<StubGateway> {
    /// Harness with default configuration and a fresh [`StubGateway`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Harness with `config` and a fresh [`StubGateway`].
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_gateway(StubGateway::new(), config)
    }
}

impl Default for TestHarness<StubGateway> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: RemoteCallGateway + 'static> TestHarness<G> {
    /// Harness around a caller-supplied gateway, e.g. a mockall mock.
    pub fn with_gateway(gateway: G, config: EngineConfig) -> Self {
        init_test_tracing();

        let provider = InMemoryStateStoreProvider::new();
        let (flow_repo, step_repo, execution_repo, log_repo) = provider.create_repositories();
        let gateway = Arc::new(gateway);

        let registry = FlowRegistry::new(flow_repo, step_repo, execution_repo);
        let engine = ExecutionEngine::new(&registry, log_repo.clone(), gateway.clone(), &config);
        let logs = LogService::new(log_repo, &config);

        Self {
            registry,
            engine,
            logs,
            gateway,
            config,
        }
    }

    /// Creates the "Order Flow" with a single `GET_ORDER` remote-call step.
    pub async fn seed_order_flow(&self) -> Result<(Flow, Step), CoreError> {
        let flow = self.registry.create_flow(order_flow()).await?;
        let step = self
            .registry
            .create_step(remote_call_step(&flow.id, "Fetch order", "GET_ORDER"))
            .await?;
        Ok((flow, step))
    }
}
