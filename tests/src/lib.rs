//! End-to-end and concurrency suites for Flowtrail.
//!
//! The suites live under `e2e/` and `concurrency/`; this crate has no code of its own.
