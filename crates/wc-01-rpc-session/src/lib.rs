//! # RPC Session (wc-01)
//!
//! Stateless request/response channel to the node daemon.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐      ┌──────────────────┐      ┌───────────────┐
//! │  RpcSession    │ ───→ │  RpcTransport    │ ───→ │ HttpTransport │ ──→ daemon
//! │ (typed calls,  │      │  (port)          │      │ (reqwest,     │
//! │  close flag)   │      └──────────────────┘      │  basic auth,  │
//! └────────────────┘                                │  Tor SOCKS)   │
//!                                                   └───────────────┘
//! ```
//!
//! ## Error Classification
//!
//! | Daemon behaviour                  | Error                      | Retried by caller |
//! |-----------------------------------|----------------------------|-------------------|
//! | Connection refused / timeout      | `RpcError::Transport`      | yes               |
//! | HTTP 401 / 403                    | `RpcError::Auth`           | never             |
//! | RPC error -28 (loading, rescan)   | `RpcError::WarmingUp`      | yes               |
//! | Any other RPC error object        | `RpcError::Application`    | no                |
//! | Unparseable reply                 | `RpcError::Protocol`       | no                |
//!
//! The session itself never retries; retry policy belongs to the connection
//! state machine.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{HttpTransport, HttpTransportConfig};
pub use domain::*;
pub use error::{RpcError, RpcResult, RPC_IN_WARMUP};
pub use ports::RpcTransport;
pub use session::RpcSession;
