//! Pure connection transition core.
//!
//! State Machine:
//! ```text
//! [Disconnected|Error] ──Start{launch}──→ [Starting] ──ParamsMissing──→ [WaitingForParams]
//!          │                                │    ↑                             │
//!          │ Start{attach}                  │    └──────── ParamsReady ────────┘
//!          ↓                                │ ProcessLaunched / DaemonFound
//!     [Connecting] ←────────────────────────┘
//!       │    ↑ RpcUnreachable
//!       │    │
//!       ├── RpcReachable ──→ [Authenticating] ──WarmingUp──→ (self)
//!       │                           │
//!       │                           └── RpcOk ──→ [WaitingForPeers] ──PeersFound──→ [Syncing] ──CaughtUp──→ [Connected]
//!       │                                                                                                       │
//!       ├── RetryExhausted ──→ [Error(unreachable)]                            HeartbeatFailed → [Connecting] ──┘
//!       └── AuthFailure ──→ [Error(auth)]
//!
//! any active ──DaemonExited{restart}──→ [Starting] | [Error(crashed)]
//! any ──Fail(r)──→ [Error(r)]        any ──Stop──→ [Disconnected]
//! ```
//!
//! The core never performs I/O. The driver feeds it events and publishes
//! whatever it returns.

use shared_types::{ConnectionStatus, FailureReason};
use tracing::debug;

/// Inputs to the transition function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Begin an attempt; `launch` selects the embedded path.
    Start { launch: bool },
    ParamsMissing,
    ParamsReady,
    ProcessLaunched,
    /// A daemon was already listening; attach instead of launching.
    DaemonFound,
    RpcUnreachable,
    RetryExhausted,
    /// The daemon answered HTTP (whatever the payload).
    RpcReachable,
    /// Daemon answered with the warm-up error code.
    WarmingUp,
    AuthFailure,
    RpcOk { peers: u32, lag: u64 },
    PeersFound { lag: u64 },
    CaughtUp,
    DaemonExited { restart: bool },
    HeartbeatFailed,
    Fail(FailureReason),
    Stop,
}

/// Outcome of feeding one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

impl Transition {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Status after a successful RPC round trip.
#[must_use]
pub fn classify_sync(peers: u32, lag: u64) -> ConnectionStatus {
    if peers == 0 {
        ConnectionStatus::WaitingForPeers
    } else if lag > 0 {
        ConnectionStatus::Syncing
    } else {
        ConnectionStatus::Connected
    }
}

/// Connection status holder with a deterministic transition function.
#[derive(Debug, Default)]
pub struct ConnectionFsm {
    state: ConnectionStatus,
    transitions: u64,
    ignored: u64,
}

impl ConnectionFsm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionStatus {
        self.state
    }

    /// Number of actual state changes so far.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Number of events that had no defined transition.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Apply `event`. Undefined pairs leave the state untouched.
    pub fn process_event(&mut self, event: ConnectionEvent) -> Transition {
        let from = self.state;
        let to = match Self::next_state(from, event) {
            Some(next) => next,
            None => {
                self.ignored += 1;
                debug!(state = %from, ?event, "[wc-03] Ignoring event with no transition");
                from
            }
        };
        if to != from {
            self.transitions += 1;
        }
        self.state = to;
        Transition { from, to }
    }

    /// The transition table. `None` means the pair is undefined.
    #[must_use]
    pub fn next_state(state: ConnectionStatus, event: ConnectionEvent) -> Option<ConnectionStatus> {
        use ConnectionEvent as E;
        use ConnectionStatus as S;

        match (state, event) {
            (_, E::Stop) => Some(S::Disconnected),
            (_, E::Fail(reason)) => Some(S::Error(reason)),

            (S::Disconnected | S::Error(_), E::Start { launch: true }) => Some(S::Starting),
            (S::Disconnected | S::Error(_), E::Start { launch: false }) => Some(S::Connecting),

            (S::Starting, E::ParamsMissing) => Some(S::WaitingForParams),
            (S::WaitingForParams, E::ParamsReady) => Some(S::Starting),
            (S::Starting, E::ProcessLaunched | E::DaemonFound) => Some(S::Connecting),

            (S::Connecting | S::Authenticating, E::RpcUnreachable) => Some(S::Connecting),
            (S::Connecting | S::Authenticating, E::RetryExhausted) => {
                Some(S::Error(FailureReason::Unreachable))
            }
            (S::Connecting | S::Authenticating, E::RpcReachable | E::WarmingUp) => {
                Some(S::Authenticating)
            }
            (S::Connecting | S::Authenticating, E::RpcOk { peers, lag }) => {
                Some(classify_sync(peers, lag))
            }

            (
                S::Connecting
                | S::Authenticating
                | S::WaitingForPeers
                | S::Syncing
                | S::Connected,
                E::AuthFailure,
            ) => Some(S::Error(FailureReason::Auth)),

            (S::WaitingForPeers, E::PeersFound { lag }) => Some(if lag > 0 {
                S::Syncing
            } else {
                S::Connected
            }),
            (S::Syncing, E::CaughtUp) => Some(S::Connected),
            (S::WaitingForPeers | S::Syncing | S::Connected, E::HeartbeatFailed) => {
                Some(S::Connecting)
            }

            (active, E::DaemonExited { restart }) if active.is_active() => Some(if restart {
                S::Starting
            } else {
                S::Error(FailureReason::Crashed)
            }),

            _ => None,
        }
    }
}
