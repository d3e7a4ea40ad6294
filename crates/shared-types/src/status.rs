//! # Connection Status
//!
//! The single authoritative view of where the wallet stands with its daemon.
//!
//! ```text
//! [Disconnected] ──start(launch)──→ [Starting] ──params missing──→ [WaitingForParams]
//!       │                              │  ↑                               │
//!       │ start(attach)                │  └──────── params ready ─────────┘
//!       ↓                              ↓
//! [Connecting] ←─────────── process launched
//!       │
//!       ├── rpc reachable ──→ [Authenticating] ──ok──→ [WaitingForPeers] → [Syncing] → [Connected]
//!       │
//!       └── retries exhausted ──→ [Error(unreachable)]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the connection ended up in `Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Daemon rejected the credentials.
    Auth,
    /// Daemon could not be reached within the retry budget.
    Unreachable,
    /// Embedded daemon exited unexpectedly.
    Crashed,
    /// Configuration was invalid or contradictory.
    Config,
    /// Proving parameters could not be provisioned.
    Params,
    /// Daemon process could not be started.
    Process,
    /// Daemon answered with something we could not interpret.
    Protocol,
}

impl FailureReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureReason::Auth => "auth",
            FailureReason::Unreachable => "unreachable",
            FailureReason::Crashed => "crashed",
            FailureReason::Config => "config",
            FailureReason::Params => "params",
            FailureReason::Process => "process",
            FailureReason::Protocol => "protocol",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Starting,
    WaitingForParams,
    Connecting,
    Authenticating,
    WaitingForPeers,
    Syncing,
    Connected,
    Error(FailureReason),
}

impl ConnectionStatus {
    /// True while an attempt is in flight or established.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(
            self,
            ConnectionStatus::Disconnected | ConnectionStatus::Error(_)
        )
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// RPC calls other than liveness probes are meaningful.
    #[must_use]
    pub const fn has_session(self) -> bool {
        matches!(
            self,
            ConnectionStatus::WaitingForPeers
                | ConnectionStatus::Syncing
                | ConnectionStatus::Connected
        )
    }

    #[must_use]
    pub const fn error_reason(self) -> Option<FailureReason> {
        match self {
            ConnectionStatus::Error(reason) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Starting => "starting",
            ConnectionStatus::WaitingForParams => "waiting_for_params",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Authenticating => "authenticating",
            ConnectionStatus::WaitingForPeers => "waiting_for_peers",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error(_) => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Error(reason) => write!(f, "error({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Status plus a human-readable detail line, as published to observers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub detail: String,
}

impl StatusSnapshot {
    #[must_use]
    pub fn new(status: ConnectionStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(FailureReason::Auth.as_str(), "auth");
        assert_eq!(FailureReason::Unreachable.to_string(), "unreachable");
        assert_eq!(
            ConnectionStatus::Error(FailureReason::Crashed).to_string(),
            "error(crashed)"
        );
    }

    #[test]
    fn test_activity() {
        assert!(!ConnectionStatus::Disconnected.is_active());
        assert!(!ConnectionStatus::Error(FailureReason::Auth).is_active());
        assert!(ConnectionStatus::Starting.is_active());
        assert!(ConnectionStatus::Connected.is_active());
        assert!(ConnectionStatus::Syncing.has_session());
        assert!(!ConnectionStatus::Authenticating.has_session());
    }

    #[test]
    fn test_status_serde_shape() {
        let json = serde_json::to_value(ConnectionStatus::Error(FailureReason::Auth)).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["reason"], "auth");
    }
}
