//! Connection domain: settings, retry budget and the pure transition core.

pub mod config;
pub mod fsm;
pub mod retry;

pub use config::{ConnectionConfig, ConnectionMode};
pub use fsm::{classify_sync, ConnectionEvent, ConnectionFsm, Transition};
pub use retry::RetryPolicy;
