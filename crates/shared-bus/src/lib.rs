//! # Shared Bus - Wallet Event Bus
//!
//! Status, progress and terminal-error notifications from the core
//! components to whoever is watching (the UI shell, logs, tests).
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Connection   │    publish()       │   Observer   │
//! │ Supervisor   │ ──────┐            │   (UI/logs)  │
//! │ Turnstile    │       │            └──────────────┘
//! └──────────────┘       ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! The bus is fire-and-forget: a slow observer lags and loses events, it
//! never blocks a producer. Anything that needs the *current* value (the
//! connection status, the session handle) reads a `watch` channel instead.
//!
//! The crate also carries the process-wide [`ShutdownController`].

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod shutdown;
pub mod subscriber;

pub use events::{component, EventFilter, EventTopic, WalletEvent};
pub use publisher::{BusStats, EventPublisher, InMemoryEventBus};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Per-subscriber backlog before it starts lagging. Sized for a full
/// params download reported in small chunks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
