/// Flow and step management
pub mod flow_registry;

/// Execution lifecycle and step execution
pub mod execution_engine;

/// Per-type step handlers
pub mod dispatch;

/// Audit log queries and administration
pub mod log_service;

/// Locks shared by the registry and the engine
pub(crate) mod locks;
