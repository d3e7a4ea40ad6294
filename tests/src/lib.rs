//! # Commercium Wallet Core Test Suite
//!
//! Flows that cross subsystem boundaries. Per-crate behaviour is tested in
//! each crate's own `tests/` directory.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── migration_flow.rs   # connection service + migration runner
//!     ├── daemon_flow.rs      # embedded launch through the service task
//!     └── runtime_http.rs     # AppContext against a mock daemon over HTTP
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p wallet-tests
//! cargo test -p wallet-tests integration::runtime_http::
//! ```

pub mod integration;
