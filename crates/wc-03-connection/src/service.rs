//! # Connection Service
//!
//! Runs the [`ConnectionStateMachine`] in its own task as the single writer
//! of the connection status.
//!
//! ```text
//!   ConnectionHandle ──commands (mpsc)──→ ┌──────────────────────┐
//!                                         │  run loop (select!)  │──→ status watch / bus
//!   heartbeat tasks ──(generation, res)──→│  - command           │
//!        ↑                                │  - heartbeat result  │
//!        └──────── spawned per tick ───── │  - wake-up deadline  │
//!                                         │  - shutdown          │
//!                                         └──────────────────────┘
//! ```
//!
//! Heartbeat RPCs never block the loop. Their results carry the generation
//! they were issued under; the driver drops results from an older one.

use crate::domain::ConnectionConfig;
use crate::error::{ConnectionError, ConnectionResult};
use crate::machine::{ConnectionStateMachine, Step};
use shared_bus::ShutdownSignal;
use shared_types::StatusSnapshot;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use wc_01_rpc_session::{RpcResult, RpcSession, SyncInfo};

const COMMAND_CHANNEL_CAPACITY: usize = 16;
const HEARTBEAT_CHANNEL_CAPACITY: usize = 8;

/// Requests accepted by the service task.
#[derive(Debug)]
pub enum ConnectionCommand {
    Start {
        config: ConnectionConfig,
        reply: oneshot::Sender<ConnectionResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front end to a running [`ConnectionService`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<ConnectionCommand>,
    status: watch::Receiver<StatusSnapshot>,
    session: watch::Receiver<Option<RpcSession>>,
}

impl ConnectionHandle {
    /// Begin an attempt. Returns once the settings were accepted or refused;
    /// progress is observed through [`ConnectionHandle::status_watch`].
    pub async fn start(&self, config: ConnectionConfig) -> ConnectionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ConnectionCommand::Start { config, reply })
            .await
            .map_err(|_| ConnectionError::ServiceStopped)?;
        rx.await.map_err(|_| ConnectionError::ServiceStopped)?
    }

    /// Disconnect, stopping an owned daemon. Resolves when done.
    pub async fn stop(&self) -> ConnectionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ConnectionCommand::Stop { reply })
            .await
            .map_err(|_| ConnectionError::ServiceStopped)?;
        rx.await.map_err(|_| ConnectionError::ServiceStopped)
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    #[must_use]
    pub fn session_watch(&self) -> watch::Receiver<Option<RpcSession>> {
        self.session.clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<RpcSession> {
        self.session.borrow().clone()
    }
}

enum Interrupt {
    Shutdown,
    Command(Option<ConnectionCommand>),
}

pub struct ConnectionService;

impl ConnectionService {
    /// Move `machine` into a new task. The task exits on `shutdown` (or when
    /// every handle is dropped) after shutting the machine down.
    pub fn spawn(
        machine: ConnectionStateMachine,
        shutdown: ShutdownSignal,
    ) -> (ConnectionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = ConnectionHandle {
            commands: tx,
            status: machine.subscribe_status(),
            session: machine.session_watch(),
        };
        let task = tokio::spawn(Self::run(machine, rx, shutdown));
        (handle, task)
    }

    async fn run(
        mut machine: ConnectionStateMachine,
        mut commands: mpsc::Receiver<ConnectionCommand>,
        mut shutdown: ShutdownSignal,
    ) {
        let (beat_tx, mut beat_rx) =
            mpsc::channel::<(u64, RpcResult<SyncInfo>)>(HEARTBEAT_CHANNEL_CAPACITY);
        let mut next: Option<Instant> = None;
        let mut beat_in_flight = false;

        info!("[wc-03] Connection service started");
        loop {
            let wake = async move {
                match next {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.triggered() => break,

                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    next = Self::handle(&mut machine, cmd, next).await;
                }

                Some((generation, result)) = beat_rx.recv() => {
                    beat_in_flight = false;
                    machine.apply_heartbeat(generation, result).await;
                    let state = machine.state();
                    if !state.has_session() {
                        next = state.is_active().then(Instant::now);
                    }
                }

                () = wake => {
                    if machine.state().has_session() {
                        if machine.check_daemon().await {
                            next = machine.state().is_active().then(Instant::now);
                            continue;
                        }
                        if !beat_in_flight {
                            if let Some(beat) = machine.heartbeat_request() {
                                beat_in_flight = true;
                                let tx = beat_tx.clone();
                                tokio::spawn(async move {
                                    let result = beat.session.sync_info().await;
                                    let _ = tx.send((beat.generation, result)).await;
                                });
                            }
                        }
                        next = Some(Instant::now() + machine.policy().heartbeat_interval);
                        continue;
                    }

                    let outcome = tokio::select! {
                        step = machine.step() => Ok(step),
                        _ = shutdown.triggered() => Err(Interrupt::Shutdown),
                        cmd = commands.recv() => Err(Interrupt::Command(cmd)),
                    };
                    match outcome {
                        Ok(Step::After(delay)) => next = Some(Instant::now() + delay),
                        Ok(Step::Idle) => next = None,
                        Err(Interrupt::Shutdown | Interrupt::Command(None)) => break,
                        Err(Interrupt::Command(Some(cmd))) => {
                            debug!("[wc-03] Step interrupted by command");
                            next = Self::handle(&mut machine, cmd, Some(Instant::now())).await;
                        }
                    }
                }
            }
        }

        machine.shutdown().await;
        info!("[wc-03] Connection service stopped");
    }

    /// Apply one command; returns the new wake-up deadline.
    async fn handle(
        machine: &mut ConnectionStateMachine,
        cmd: ConnectionCommand,
        next: Option<Instant>,
    ) -> Option<Instant> {
        match cmd {
            ConnectionCommand::Start { config, reply } => {
                let result = machine.begin(config).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    Some(Instant::now())
                } else {
                    next
                }
            }
            ConnectionCommand::Stop { reply } => {
                machine.stop().await;
                let _ = reply.send(());
                None
            }
        }
    }
}
