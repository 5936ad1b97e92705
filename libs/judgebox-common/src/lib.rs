//! Types shared between the execution engine and its callers.

pub mod config;
pub mod types;

pub use config::SandboxConfig;
pub use types::{ExecutionReport, ExecutionRequest, ExecutionResult, Status, TestCase};
