//! # Connection State Machine (wc-03)
//!
//! Owns the single authoritative [`ConnectionStatus`](shared_types::ConnectionStatus)
//! and drives the daemon supervisor (wc-02) and RPC session (wc-01) to reach
//! it.
//!
//! ## Layers
//!
//! | Layer | Type | Does I/O |
//! |-------|------|----------|
//! | Transition core | [`ConnectionFsm`] | no |
//! | Driver | [`ConnectionStateMachine`] | yes (awaited inline) |
//! | Service | [`ConnectionService`] | spawns heartbeats, owns the driver |
//!
//! ## Guarantees
//!
//! - Manual settings missing host, port or credentials are refused before
//!   any transition.
//! - Credentials the daemon rejected are never sent again; only new
//!   credentials leave `Error(auth)`.
//! - Transport failures are retried with exponential backoff, bounded by
//!   attempt count and wall-clock time.
//! - Each actual status change is published exactly once (status watch and
//!   `StatusChanged` bus event). Re-entering the same state only updates the
//!   detail line.
//! - Heartbeat results issued under an older generation are discarded.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod machine;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::HttpSessionFactory;
pub use domain::{
    ConnectionConfig, ConnectionEvent, ConnectionFsm, ConnectionMode, RetryPolicy, Transition,
};
pub use error::{ConnectionError, ConnectionResult};
pub use machine::{ConnectionStateMachine, Heartbeat, Step};
pub use ports::SessionFactory;
pub use service::{ConnectionCommand, ConnectionHandle, ConnectionService};
