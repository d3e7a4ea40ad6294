//! # Commercium Wallet Runtime
//!
//! The headless entry point of the wallet core.
//!
//! ## Modular Structure
//!
//! - `cli` - Command-line flags
//! - `container/` - Layered configuration and the owned [`AppContext`]
//! - `logging` - `tracing` subscriber setup
//!
//! ## Startup Sequence
//!
//! 1. Parse flags, load configuration (file, environment, flags) and validate
//! 2. Install the log subscriber
//! 3. Build the [`AppContext`] and spawn the subsystem tasks
//! 4. Connect (attach, or launch the embedded daemon)
//! 5. Resume a persisted migration, or begin a requested one, once connected
//! 6. On Ctrl+C, trigger shutdown and await every task

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cli;
pub mod container;
pub mod logging;

pub use cli::Args;
pub use container::{AppContext, ConfigError, ConfigResult, WalletConfig};
pub use logging::init_logging;
