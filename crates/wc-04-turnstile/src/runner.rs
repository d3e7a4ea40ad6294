//! # Migration Runner
//!
//! Owns the [`TurnstileEngine`] inside a task and ticks it on the deadlines
//! it asks for, but only while the connection reports `Connected`.
//!
//! ```text
//!   TurnstileHandle ──begin/reset──→ ┌──────────────────────┐
//!                   ──cancel───────→ │  run loop (select!)  │──→ snapshot watch
//!   connection status watch ───────→ │  - wake-up deadline  │
//!   connection session watch ──────→ │  - shutdown          │
//!                                    └──────────────────────┘
//! ```
//!
//! A cancel request interrupts a tick in progress; whatever that tick would
//! have observed is dropped. Begin and reset wait for the tick to finish.

use crate::domain::{MigrationPlan, MigrationRequest, MigrationSnapshot};
use crate::engine::{TurnstileEngine, Wake};
use crate::error::{TurnstileError, TurnstileResult};
use shared_bus::ShutdownSignal;
use shared_types::{ConnectionStatus, StatusSnapshot};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use wc_01_rpc_session::RpcSession;

const COMMAND_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug)]
pub enum TurnstileCommand {
    Begin {
        request: MigrationRequest,
        reply: oneshot::Sender<TurnstileResult<MigrationPlan>>,
    },
    Reset {
        reply: oneshot::Sender<TurnstileResult<()>>,
    },
}

type CancelReply = oneshot::Sender<TurnstileResult<()>>;

/// Cloneable front end to a running [`MigrationRunner`].
#[derive(Debug, Clone)]
pub struct TurnstileHandle {
    commands: mpsc::Sender<TurnstileCommand>,
    cancels: mpsc::Sender<CancelReply>,
    snapshot: watch::Receiver<MigrationSnapshot>,
}

impl TurnstileHandle {
    /// Lock a plan against the live session. Fails with `NotConnected`
    /// unless the connection is `Connected`.
    pub async fn begin(&self, request: MigrationRequest) -> TurnstileResult<MigrationPlan> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(TurnstileCommand::Begin { request, reply })
            .await
            .map_err(|_| TurnstileError::RunnerStopped)?;
        rx.await.map_err(|_| TurnstileError::RunnerStopped)?
    }

    pub async fn reset(&self) -> TurnstileResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(TurnstileCommand::Reset { reply })
            .await
            .map_err(|_| TurnstileError::RunnerStopped)?;
        rx.await.map_err(|_| TurnstileError::RunnerStopped)?
    }

    pub async fn cancel(&self) -> TurnstileResult<()> {
        let (reply, rx) = oneshot::channel();
        self.cancels
            .send(reply)
            .await
            .map_err(|_| TurnstileError::RunnerStopped)?;
        rx.await.map_err(|_| TurnstileError::RunnerStopped)?
    }

    #[must_use]
    pub fn snapshot(&self) -> MigrationSnapshot {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn snapshot_watch(&self) -> watch::Receiver<MigrationSnapshot> {
        self.snapshot.clone()
    }
}

pub struct MigrationRunner;

impl MigrationRunner {
    /// Move `engine` into a new task fed by the connection's status and
    /// session watches.
    pub fn spawn(
        engine: TurnstileEngine,
        status: watch::Receiver<StatusSnapshot>,
        session: watch::Receiver<Option<RpcSession>>,
        shutdown: ShutdownSignal,
    ) -> (TurnstileHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let handle = TurnstileHandle {
            commands: command_tx,
            cancels: cancel_tx,
            snapshot: snapshot_rx,
        };
        let task = tokio::spawn(Self::run(
            engine,
            command_rx,
            cancel_rx,
            status,
            session,
            snapshot_tx,
            shutdown,
        ));
        (handle, task)
    }

    async fn run(
        mut engine: TurnstileEngine,
        mut commands: mpsc::Receiver<TurnstileCommand>,
        mut cancels: mpsc::Receiver<CancelReply>,
        mut status: watch::Receiver<StatusSnapshot>,
        session: watch::Receiver<Option<RpcSession>>,
        snapshot_tx: watch::Sender<MigrationSnapshot>,
        mut shutdown: ShutdownSignal,
    ) {
        let mut next = Self::deadline(&engine, engine.pending_wake());
        let mut status_open = true;

        info!(phase = engine.phase().label(), "[wc-04] Migration runner started");
        loop {
            let connected = status.borrow().status == ConnectionStatus::Connected;
            let wake_at = if connected { next } else { None };
            let wake = async move {
                match wake_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.triggered() => break,

                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    Self::handle(&mut engine, cmd, &status, &session).await;
                    next = Self::deadline(&engine, engine.pending_wake());
                }

                reply = cancels.recv() => {
                    let Some(reply) = reply else { break };
                    let _ = reply.send(engine.cancel().await);
                    next = None;
                }

                changed = status.changed(), if status_open => {
                    if changed.is_err() {
                        debug!("[wc-04] Connection status source closed");
                        status_open = false;
                    }
                }

                () = wake => {
                    let Some(current) = session.borrow().clone() else {
                        next = Some(Instant::now() + engine.config().retry_delay);
                        continue;
                    };
                    let outcome = tokio::select! {
                        result = engine.tick(&current) => Ok(result),
                        reply = cancels.recv() => Err(reply),
                    };
                    match outcome {
                        Ok(Ok(wake)) => next = Self::deadline(&engine, wake),
                        Ok(Err(e)) => {
                            warn!(error = %e, phase = engine.phase().label(), "[wc-04] Migration tick failed, retrying");
                            next = Some(Instant::now() + engine.config().retry_delay);
                        }
                        Err(Some(reply)) => {
                            debug!("[wc-04] Tick abandoned for cancellation");
                            let _ = reply.send(engine.cancel().await);
                            next = None;
                        }
                        Err(None) => break,
                    }
                }
            }

            snapshot_tx.send_if_modified(|current| {
                let fresh = engine.snapshot();
                if *current == fresh {
                    false
                } else {
                    *current = fresh;
                    true
                }
            });
        }
        info!(phase = engine.phase().label(), "[wc-04] Migration runner stopped");
    }

    async fn handle(
        engine: &mut TurnstileEngine,
        cmd: TurnstileCommand,
        status: &watch::Receiver<StatusSnapshot>,
        session: &watch::Receiver<Option<RpcSession>>,
    ) {
        match cmd {
            TurnstileCommand::Begin { request, reply } => {
                let live = (status.borrow().status == ConnectionStatus::Connected)
                    .then(|| session.borrow().clone())
                    .flatten();
                let result = match live {
                    Some(session) => engine.begin(&session, request).await,
                    None => Err(TurnstileError::NotConnected),
                };
                let _ = reply.send(result);
            }
            TurnstileCommand::Reset { reply } => {
                let _ = reply.send(engine.reset().await);
            }
        }
    }

    /// Map an engine wake-up onto the runtime clock.
    fn deadline(engine: &TurnstileEngine, wake: Wake) -> Option<Instant> {
        match wake {
            Wake::Now => Some(Instant::now()),
            Wake::At(at) => {
                let delay = (at - engine.now()).to_std().unwrap_or(Duration::ZERO);
                Some(Instant::now() + delay)
            }
            Wake::Idle | Wake::Done => None,
        }
    }
}
