//! Mock implementation of the RemoteCallGateway trait.

use async_trait::async_trait;
use flowtrail_core::{CoreError, FunctionSchema, JsonMap, RemoteCallGateway, ValidationReport};
use mockall::mock;
use serde_json::{json, Value};

// Generate the mock implementation
mock! {
    pub RemoteCallGateway {}

    #[async_trait]
    impl RemoteCallGateway for RemoteCallGateway {
        async fn call(&self, function_name: &str, parameters: &JsonMap) -> Result<Value, CoreError>;
        async fn describe(&self, function_name: &str) -> Result<FunctionSchema, CoreError>;
        async fn validate(&self, function_name: &str, parameters: &JsonMap) -> Result<ValidationReport, CoreError>;
        async fn close(&self) -> Result<(), CoreError>;
    }
}

/// Creates a mock gateway whose calls succeed with a success document.
pub fn create_mock_gateway() -> MockRemoteCallGateway {
    let mut mock = MockRemoteCallGateway::new();

    mock.expect_call().returning(|function_name, parameters| {
        Ok(json!({
            "function_name": function_name,
            "parameters": parameters,
            "result": {"status": "success", "data": {}},
        }))
    });

    mock.expect_describe()
        .returning(|function_name| Ok(FunctionSchema::new(function_name)));

    mock.expect_validate()
        .returning(|_, _| Ok(ValidationReport::ok()));

    mock.expect_close().returning(|| Ok(()));

    mock
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_mock_succeeds() {
        let gateway = create_mock_gateway();
        let result = gateway.call("GET_ORDER", &JsonMap::new()).await.unwrap();
        assert_eq!(result["result"]["status"], json!("success"));
        assert!(gateway.validate("GET_ORDER", &JsonMap::new()).await.unwrap().valid);
    }
}
