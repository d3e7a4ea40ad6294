//! # Daemon Supervisor (wc-02)
//!
//! Owns the embedded node daemon for the life of the wallet.
//!
//! ## Responsibilities
//!
//! - Read `commercium.conf`, generating one with random RPC credentials on
//!   first run, and refuse `daemon=1` (a forking daemon cannot be supervised).
//! - Make sure the five proving-parameter files exist, downloading the
//!   missing ones with bounded retries and monotonic progress.
//! - Launch the daemon with the right flags (`-datadir`, `-testnet`, Tor
//!   proxy) and capture its stderr.
//! - Classify exits: requested, external (code 0), misconfiguration
//!   (code 1), crash (anything else); restart crashes within a budget.
//! - Shut down explicitly: `stop` RPC, bounded wait, then kill.
//!
//! The supervisor never changes connection status itself; it reports to the
//! connection state machine (wc-03), which owns that value.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod provisioner;
pub mod supervisor;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{HttpParamsDownloader, TokioProcessLauncher};
pub use domain::{DaemonConf, DaemonExit, ExitKind, RestartPolicy, PARAM_FILES};
pub use error::{SupervisorError, SupervisorResult};
pub use ports::{DaemonProcess, LaunchSpec, ParamsDownloader, ProcessLauncher};
pub use provisioner::ParamsProvisioner;
pub use supervisor::{daemon_args, default_daemon_binary, DaemonSupervisor, SupervisorConfig};
