//! Mock implementations of Flowtrail interfaces.

pub mod gateway;

pub use gateway::*;
