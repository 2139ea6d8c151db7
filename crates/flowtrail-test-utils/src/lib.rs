//! Testing utilities for the Flowtrail platform.
//!
//! This crate provides a mockall gateway mock, a scripted stub gateway,
//! fixtures for flows and steps, a harness that wires the registry, engine
//! and log service over the in-memory store, and assertion helpers.

pub mod assertions;
pub mod builders;
pub mod data_generators;
pub mod implementations;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use builders::TestHarness;
pub use implementations::{RecordedCall, StubGateway};
pub use mocks::{create_mock_gateway, MockRemoteCallGateway};
