//! Environment setup builders for testing the Flowtrail platform.
//!
//! This module wires the registry, engine and log service over a shared
//! in-memory store with a controllable gateway.

mod harness;

// Re-export all builders for easy access
pub use harness::*;
