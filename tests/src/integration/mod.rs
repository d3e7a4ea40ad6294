//! Cross-subsystem flows.

pub mod daemon_flow;
pub mod migration_flow;
pub mod runtime_http;
