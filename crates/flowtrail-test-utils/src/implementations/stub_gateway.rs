//! Scripted implementation of the RemoteCallGateway trait.

use async_trait::async_trait;
use chrono::Utc;
use flowtrail_core::{CoreError, FunctionSchema, JsonMap, RemoteCallGateway};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A call received by a [`StubGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Remote function that was called
    pub function_name: String,
    /// Parameters passed along
    pub parameters: JsonMap,
}

/// Thread-safe gateway fake for testing.
///
/// Scripted responses are consumed in order per function; once a function's
/// script is exhausted every call answers with a success document.
#[derive(Clone, Default)]
pub struct StubGateway {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Result<Value, CoreError>>>>>,
    schemas: Arc<RwLock<HashMap<String, FunctionSchema>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    call_started: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for StubGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubGateway")
            .field("call_count", &self.calls.read().len())
            .field("delay", &*self.delay.read())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StubGateway {
    /// Creates a stub that answers every call with a success document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    /// Queues a response for the next unanswered call to `function_name`.
    pub fn respond_with(&self, function_name: &str, response: Result<Value, CoreError>) {
        self.scripts
            .lock()
            .entry(function_name.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues `times` failures for `function_name`.
    pub fn fail_times(&self, function_name: &str, times: usize, error: CoreError) {
        for _ in 0..times {
            self.respond_with(function_name, Err(error.clone()));
        }
    }

    /// Registers the schema `describe` returns for the schema's function.
    pub fn register_schema(&self, schema: FunctionSchema) {
        self.schemas
            .write()
            .insert(schema.function_name.clone(), schema);
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    /// Number of calls received for `function_name`.
    pub fn call_count(&self, function_name: &str) -> usize {
        self.calls
            .read()
            .iter()
            .filter(|call| call.function_name == function_name)
            .count()
    }

    /// Waits until at least `count` calls have arrived.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.call_started.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.calls.read().len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Document returned when no response is scripted.
    pub fn success_document(function_name: &str, parameters: &JsonMap) -> Value {
        json!({
            "function_name": function_name,
            "parameters": parameters,
            "result": {
                "status": "success",
                "message": format!("{} completed", function_name),
                "data": {},
            },
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl RemoteCallGateway for StubGateway {
    async fn call(&self, function_name: &str, parameters: &JsonMap) -> Result<Value, CoreError> {
        if self.is_closed() {
            return Err(CoreError::GatewayError("gateway is closed".to_string()));
        }

        self.calls.write().push(RecordedCall {
            function_name: function_name.to_string(),
            parameters: parameters.clone(),
        });
        self.call_started.notify_waiters();

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(function_name)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(Self::success_document(function_name, parameters)))
    }

    async fn describe(&self, function_name: &str) -> Result<FunctionSchema, CoreError> {
        Ok(self
            .schemas
            .read()
            .get(function_name)
            .cloned()
            .unwrap_or_else(|| FunctionSchema::new(function_name)))
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrail_core::FieldSpec;

    #[tokio::test]
    async fn test_scripted_responses_then_default() {
        let gateway = StubGateway::new();
        gateway.respond_with("GET_ORDER", Ok(json!({"result": {"status": "not_found"}})));
        gateway.fail_times("GET_ORDER", 1, CoreError::GatewayError("down".into()));

        let params = JsonMap::new();
        let first = gateway.call("GET_ORDER", &params).await.unwrap();
        assert_eq!(first["result"]["status"], json!("not_found"));
        assert!(gateway.call("GET_ORDER", &params).await.is_err());
        let third = gateway.call("GET_ORDER", &params).await.unwrap();
        assert_eq!(third["result"]["status"], json!("success"));
        assert_eq!(gateway.call_count("GET_ORDER"), 3);
    }

    #[tokio::test]
    async fn test_validate_uses_registered_schema() {
        let gateway = StubGateway::new();
        let mut schema = FunctionSchema::new("GET_ORDER");
        schema.imports.push(FieldSpec::required("order_id", "string"));
        gateway.register_schema(schema);

        let report = gateway.validate("GET_ORDER", &JsonMap::new()).await.unwrap();
        assert!(!report.valid);

        let report = gateway.validate("OTHER", &JsonMap::new()).await.unwrap();
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_closed_gateway_rejects_calls() {
        let gateway = StubGateway::new();
        gateway.close().await.unwrap();
        assert!(gateway.is_closed());
        assert!(gateway.call("GET_ORDER", &JsonMap::new()).await.is_err());
        assert!(gateway.calls().is_empty());
    }
}
