use thiserror::Error;

/// Core error type for the Flowtrail runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("flow", "step", "execution", "log entry")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Entity exists but a relationship or field constraint is violated
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The remote-call gateway invocation itself failed
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// The remote-call gateway did not answer within the configured timeout
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    /// The operation was aborted because its execution was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Expression evaluation error
    #[error("Expression evaluation error: {0}")]
    ExpressionError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification of a [`CoreError`], used by boundary layers to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 404-equivalent
    NotFound,
    /// 4xx-equivalent
    Validation,
    /// 5xx-equivalent caused by the gateway
    Gateway,
    /// 5xx-equivalent caused by the engine or its store
    Internal,
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::ValidationError(_) | CoreError::ExpressionError(_) => ErrorKind::Validation,
            CoreError::GatewayError(_)
            | CoreError::GatewayTimeout(_)
            | CoreError::Cancelled(_) => ErrorKind::Gateway,
            CoreError::ConfigurationError(_)
            | CoreError::SerializationError(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry policy may try the failed gateway call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::GatewayError(_) | CoreError::GatewayTimeout(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

/// Result alias used throughout the core
pub type CoreResult<T> = Result<T, CoreError>;
