//! Test implementations (fakes) of Flowtrail interfaces.
//!
//! Higher fidelity than mocks: scripted behaviour with call recording.

pub mod stub_gateway;

pub use stub_gateway::*;
