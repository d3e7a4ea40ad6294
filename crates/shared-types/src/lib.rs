//! # Shared Types Crate
//!
//! Domain values used across the wallet core.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-crate value lives here, so the
//!   connection machine, the daemon supervisor and the migration engine agree
//!   on what an amount, a status or a failure is.
//! - **Exact Arithmetic**: coin amounts are integer zatoshis. Floating point
//!   only appears at the RPC boundary and is converted immediately.
//! - **No UI Types**: statuses carry a machine-readable reason plus a human
//!   readable detail string; rendering is somebody else's job.

pub mod entities;
pub mod errors;
pub mod progress;
pub mod status;

pub use entities::*;
pub use errors::*;
pub use progress::*;
pub use status::*;
