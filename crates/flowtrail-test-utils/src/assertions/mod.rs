//! Assertion utilities for validating Flowtrail data structures.
//!
//! Helpers return a `Result` so tests can report the mismatch with `?`
//! or `unwrap()` as they prefer.

mod log_entries;

// Re-export all assertion helpers for easy access
pub use log_entries::*;
