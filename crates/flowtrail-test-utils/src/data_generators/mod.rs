//! Test data generators for the Flowtrail platform.
//!
//! This module provides functions for generating flows, steps and
//! parameter documents used across the test suites.

mod fixtures;

// Re-export all data generators for easy access
pub use fixtures::*;
