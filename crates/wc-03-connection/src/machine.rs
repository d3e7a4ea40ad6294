//! # Connection Driver
//!
//! Walks the attach/launch sequence by feeding [`ConnectionEvent`]s into the
//! pure [`ConnectionFsm`] and performing the I/O each state calls for.
//!
//! ```text
//! begin ──→ step ──→ step ──→ ... ──→ (session state) ──→ monitor_tick ...
//!             │
//!             ├─ Starting:          conf → probe existing → params? → launch
//!             ├─ WaitingForParams:  provision parameter files
//!             ├─ Connecting/Auth:   one RPC probe, backoff on transport errors
//!             └─ session states:    heartbeat (sync_info) + daemon exit poll
//! ```
//!
//! The driver is the only writer of the connection status. Every actual
//! change is published once on the status watch and once on the event bus.

use crate::domain::{
    ConnectionConfig, ConnectionEvent, ConnectionFsm, ConnectionMode, RetryPolicy, Transition,
};
use crate::error::{ConnectionError, ConnectionResult};
use crate::ports::SessionFactory;
use shared_bus::{component, EventPublisher, WalletEvent};
use shared_types::{ConnectionStatus, FailureReason, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wc_01_rpc_session::{RpcCredentials, RpcEndpoint, RpcError, RpcResult, RpcSession, SyncInfo};
use wc_02_daemon_supervisor::domain::CONF_FILE_NAME;
use wc_02_daemon_supervisor::{DaemonConf, DaemonExit, DaemonSupervisor, ExitKind};

/// What the caller should do after a [`ConnectionStateMachine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Call `step` again after this delay.
    After(Duration),
    /// Nothing to do until a new command arrives.
    Idle,
}

/// A heartbeat to run outside the driver.
///
/// The result must be fed back through
/// [`ConnectionStateMachine::apply_heartbeat`] with the same generation.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub generation: u64,
    pub session: RpcSession,
}

/// Human-readable detail for a successful sync probe.
fn sync_detail(info: SyncInfo) -> String {
    if info.peers == 0 {
        format!("Waiting for peers (height {})", info.blocks)
    } else if info.lag > 0 {
        format!(
            "Syncing: {} blocks behind (height {}, {} peers)",
            info.lag, info.blocks, info.peers
        )
    } else {
        format!("Connected at height {} with {} peers", info.blocks, info.peers)
    }
}

pub struct ConnectionStateMachine {
    fsm: ConnectionFsm,
    policy: RetryPolicy,
    sessions: Arc<dyn SessionFactory>,
    supervisor: Option<DaemonSupervisor>,
    publisher: Arc<dyn EventPublisher>,
    status_tx: watch::Sender<StatusSnapshot>,
    session_tx: watch::Sender<Option<RpcSession>>,

    config: Option<ConnectionConfig>,
    session: Option<RpcSession>,
    endpoint: Option<RpcEndpoint>,
    credentials: Option<RpcCredentials>,
    /// Credentials the daemon refused; never sent again.
    rejected: Option<RpcCredentials>,

    /// Bumped whenever in-flight heartbeat results become meaningless.
    generation: u64,
    failures: u32,
    attempt_started: Instant,
    warmup_started: Option<Instant>,
    probed: bool,
    owns_daemon: bool,
}

impl ConnectionStateMachine {
    /// `supervisor` is `None` when this build cannot launch a daemon; embedded
    /// mode is then rejected as a configuration error.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        supervisor: Option<DaemonSupervisor>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let (session_tx, _) = watch::channel(None);
        Self {
            fsm: ConnectionFsm::new(),
            policy: RetryPolicy::default(),
            sessions,
            supervisor,
            publisher,
            status_tx,
            session_tx,
            config: None,
            session: None,
            endpoint: None,
            credentials: None,
            rejected: None,
            generation: 0,
            failures: 0,
            attempt_started: Instant::now(),
            warmup_started: None,
            probed: false,
            owns_daemon: false,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    // =========================================================================
    // Observation
    // =========================================================================

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionStatus {
        self.fsm.state()
    }

    /// Receiver notified once per actual status change.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Receiver holding the live session while one is established.
    #[must_use]
    pub fn session_watch(&self) -> watch::Receiver<Option<RpcSession>> {
        self.session_tx.subscribe()
    }

    /// The session, once the daemon has answered successfully.
    #[must_use]
    pub fn session(&self) -> Option<RpcSession> {
        self.session_tx.borrow().clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// True while the driver owns a daemon it launched.
    #[must_use]
    pub fn owns_daemon(&self) -> bool {
        self.owns_daemon
    }

    #[must_use]
    pub fn supervisor(&self) -> Option<&DaemonSupervisor> {
        self.supervisor.as_ref()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Validate `config` and enter the first state of an attempt.
    ///
    /// Invalid settings and previously rejected credentials are refused here,
    /// before any transition or RPC.
    pub async fn begin(&mut self, config: ConnectionConfig) -> ConnectionResult<()> {
        let state = self.fsm.state();
        if state.is_active() {
            return Err(ConnectionError::AlreadyActive(state));
        }
        config.validate()?;

        let mode = config.mode();
        if mode == ConnectionMode::Embedded && self.supervisor.is_none() {
            return Err(ConnectionError::Config(
                "embedded daemon support is not available".into(),
            ));
        }
        if mode == ConnectionMode::Manual
            && self.rejected.is_some()
            && config.credentials == self.rejected
        {
            warn!("[wc-03] Refusing to retry with rejected credentials");
            return Err(ConnectionError::CredentialsRejected);
        }

        self.drop_session();
        self.generation += 1;
        self.config = Some(config);
        self.probed = false;
        self.warmup_started = None;
        self.reset_attempt();

        let launch = mode == ConnectionMode::Embedded;
        info!(?mode, "[wc-03] Starting connection attempt");
        let detail = if launch {
            "Starting embedded daemon"
        } else {
            "Connecting to daemon"
        };
        self.apply(ConnectionEvent::Start { launch }, detail).await;
        Ok(())
    }

    /// Run an attempt until a session exists or the attempt failed.
    pub async fn start(&mut self, config: ConnectionConfig) -> ConnectionResult<StatusSnapshot> {
        self.begin(config).await?;
        loop {
            let state = self.fsm.state();
            if state.has_session() || !state.is_active() {
                return Ok(self.status());
            }
            match self.step().await {
                Step::After(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
                Step::After(_) => {}
                Step::Idle => return Ok(self.status()),
            }
        }
    }

    /// Perform the work the current state calls for.
    pub async fn step(&mut self) -> Step {
        match self.fsm.state() {
            ConnectionStatus::Starting => self.step_starting().await,
            ConnectionStatus::WaitingForParams => self.step_params().await,
            ConnectionStatus::Connecting | ConnectionStatus::Authenticating => {
                self.step_connect().await
            }
            ConnectionStatus::WaitingForPeers
            | ConnectionStatus::Syncing
            | ConnectionStatus::Connected => {
                self.monitor_tick().await;
                let state = self.fsm.state();
                if state.has_session() {
                    Step::After(self.policy.heartbeat_interval)
                } else if state.is_active() {
                    Step::After(Duration::ZERO)
                } else {
                    Step::Idle
                }
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error(_) => Step::Idle,
        }
    }

    /// One inline heartbeat: daemon exit check, then `sync_info`.
    pub async fn monitor_tick(&mut self) {
        if self.check_daemon().await {
            return;
        }
        let Some(heartbeat) = self.heartbeat_request() else {
            return;
        };
        let result = heartbeat.session.sync_info().await;
        self.apply_heartbeat(heartbeat.generation, result).await;
    }

    /// The heartbeat to run now, if a session is established.
    #[must_use]
    pub fn heartbeat_request(&self) -> Option<Heartbeat> {
        if !self.fsm.state().has_session() {
            return None;
        }
        self.session.clone().map(|session| Heartbeat {
            generation: self.generation,
            session,
        })
    }

    /// Feed back a heartbeat result. Returns `false` if it was stale.
    pub async fn apply_heartbeat(&mut self, generation: u64, result: RpcResult<SyncInfo>) -> bool {
        let state = self.fsm.state();
        if generation != self.generation || !state.has_session() {
            debug!(
                generation,
                current = self.generation,
                %state,
                "[wc-03] Discarding stale heartbeat"
            );
            return false;
        }

        match result {
            Ok(info) => {
                let detail = sync_detail(info);
                match state {
                    ConnectionStatus::WaitingForPeers if info.peers > 0 => {
                        self.apply(ConnectionEvent::PeersFound { lag: info.lag }, detail)
                            .await;
                    }
                    ConnectionStatus::Syncing if info.lag == 0 => {
                        self.apply(ConnectionEvent::CaughtUp, detail).await;
                    }
                    _ => self.set_detail(detail),
                }
            }
            Err(RpcError::Auth { status }) => {
                warn!(status, "[wc-03] Daemon started rejecting credentials");
                self.rejected = self.credentials.clone();
                self.drop_session();
                self.apply(ConnectionEvent::AuthFailure, "RPC credentials were rejected")
                    .await;
            }
            Err(RpcError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "[wc-03] Heartbeat failed, reconnecting");
                self.reset_attempt();
                self.apply(
                    ConnectionEvent::HeartbeatFailed,
                    format!("Lost contact with daemon: {e}"),
                )
                .await;
            }
        }
        true
    }

    /// Poll the owned daemon for an exit. Returns `true` if it exited.
    pub async fn check_daemon(&mut self) -> bool {
        if !self.owns_daemon {
            return false;
        }
        let exit = match self.supervisor.as_mut() {
            Some(supervisor) => supervisor.poll_exit().await,
            None => None,
        };
        match exit {
            Some(exit) => {
                self.handle_exit(exit).await;
                true
            }
            None => false,
        }
    }

    /// Tear down the attempt. An owned daemon is stopped and awaited.
    pub async fn stop(&mut self) {
        self.generation += 1;
        if self.owns_daemon {
            if let Some(supervisor) = self.supervisor.as_mut() {
                if let Some(exit) = supervisor.shutdown(self.session.as_ref()).await {
                    info!(exit = %exit.summary(), "[wc-03] Embedded daemon stopped");
                }
            }
            self.owns_daemon = false;
        }
        self.drop_session();
        self.apply(ConnectionEvent::Stop, "Disconnected").await;
    }

    /// Explicit teardown on application exit.
    pub async fn shutdown(&mut self) {
        info!("[wc-03] Shutting down connection");
        self.stop().await;
    }

    // =========================================================================
    // States
    // =========================================================================

    async fn step_starting(&mut self) -> Step {
        let Some(config) = self.config.clone() else {
            return self.fail(FailureReason::Config, "no connection settings").await;
        };

        let conf = match self.supervisor.as_mut() {
            Some(supervisor) => supervisor.prepare_conf(),
            None => {
                return self
                    .fail(FailureReason::Config, "embedded daemon support is not available")
                    .await
            }
        };
        let conf = match conf {
            Ok(conf) => conf,
            Err(e) => return self.fail(FailureReason::Config, e.to_string()).await,
        };
        if let Err((reason, detail)) = self.open_session(&config, Some(&conf)) {
            return self.fail(reason, detail).await;
        }

        if !self.probed {
            self.probed = true;
            let session = self.session.clone();
            let answer = match (self.supervisor.as_ref(), session) {
                (Some(supervisor), Some(session)) => supervisor.probe_existing(&session).await,
                _ => None,
            };
            if let Some(answer) = answer {
                info!("[wc-03] Daemon already running, attaching");
                self.owns_daemon = false;
                self.reset_attempt();
                self.apply(ConnectionEvent::DaemonFound, "Attaching to running daemon")
                    .await;
                // A rejection already counts as the one authentication attempt.
                if let Err(e @ RpcError::Auth { .. }) = answer {
                    return self.handle_probe(Err(e)).await;
                }
                return Step::After(Duration::ZERO);
            }
        }

        let params_missing = self
            .supervisor
            .as_ref()
            .is_some_and(DaemonSupervisor::params_missing);
        if params_missing {
            self.apply(ConnectionEvent::ParamsMissing, "Downloading proving parameters")
                .await;
            return Step::After(Duration::ZERO);
        }

        let launched = match self.supervisor.as_mut() {
            Some(supervisor) => supervisor.launch(),
            None => return Step::Idle,
        };
        match launched {
            Ok(()) => {
                self.owns_daemon = true;
                self.reset_attempt();
                self.apply(
                    ConnectionEvent::ProcessLaunched,
                    "Daemon started, waiting for RPC",
                )
                .await;
                Step::After(self.policy.warmup_poll)
            }
            Err(e) => self.fail(FailureReason::Process, e.to_string()).await,
        }
    }

    async fn step_params(&mut self) -> Step {
        let result = match self.supervisor.as_ref() {
            Some(supervisor) => supervisor.provision_params().await,
            None => return Step::Idle,
        };
        match result {
            Ok(fetched) => {
                info!(fetched, "[wc-03] Proving parameters ready");
                self.apply(ConnectionEvent::ParamsReady, "Proving parameters ready")
                    .await;
                Step::After(Duration::ZERO)
            }
            Err(e) => self.fail(FailureReason::Params, e.to_string()).await,
        }
    }

    async fn step_connect(&mut self) -> Step {
        if self.check_daemon().await {
            return if self.fsm.state().is_active() {
                Step::After(Duration::ZERO)
            } else {
                Step::Idle
            };
        }

        if self.session.is_none() {
            let Some(config) = self.config.clone() else {
                return self.fail(FailureReason::Config, "no connection settings").await;
            };
            let conf = match config.mode() {
                ConnectionMode::Manual => None,
                ConnectionMode::Embedded | ConnectionMode::AttachOnly => {
                    match Self::load_conf(&config) {
                        Ok(conf) => Some(conf),
                        Err(detail) => return self.fail(FailureReason::Config, detail).await,
                    }
                }
            };
            if let Err((reason, detail)) = self.open_session(&config, conf.as_ref()) {
                return self.fail(reason, detail).await;
            }
        }
        let Some(session) = self.session.clone() else {
            return Step::Idle;
        };

        let result = session.sync_info().await;
        self.handle_probe(result).await
    }

    async fn handle_probe(&mut self, result: RpcResult<SyncInfo>) -> Step {
        match result {
            Ok(info) => {
                self.apply(ConnectionEvent::RpcReachable, "Daemon answered")
                    .await;
                self.failures = 0;
                self.warmup_started = None;
                self.rejected = None;
                if self.owns_daemon {
                    if let Some(supervisor) = self.supervisor.as_mut() {
                        supervisor.mark_healthy();
                    }
                }
                self.apply(
                    ConnectionEvent::RpcOk {
                        peers: info.peers,
                        lag: info.lag,
                    },
                    sync_detail(info),
                )
                .await;
                Step::After(self.policy.heartbeat_interval)
            }
            Err(RpcError::WarmingUp { message }) => {
                let started = *self.warmup_started.get_or_insert_with(Instant::now);
                self.reset_attempt();
                self.apply(
                    ConnectionEvent::WarmingUp,
                    format!("Daemon is starting up: {message}"),
                )
                .await;
                if started.elapsed() >= self.policy.warmup_timeout {
                    return self
                        .fail(
                            FailureReason::Unreachable,
                            "daemon did not finish starting up in time",
                        )
                        .await;
                }
                Step::After(self.policy.warmup_poll)
            }
            Err(RpcError::Auth { status }) => {
                self.apply(ConnectionEvent::RpcReachable, "Daemon answered")
                    .await;
                warn!(status, "[wc-03] Daemon rejected RPC credentials");
                self.rejected = self.credentials.clone();
                self.drop_session();
                self.apply(ConnectionEvent::AuthFailure, "RPC credentials were rejected")
                    .await;
                Step::Idle
            }
            Err(e @ (RpcError::Application { .. } | RpcError::Protocol(_))) => {
                self.apply(ConnectionEvent::RpcReachable, "Daemon answered")
                    .await;
                self.fail(FailureReason::Protocol, e.to_string()).await
            }
            Err(RpcError::Transport(reason)) => {
                self.failures += 1;
                let elapsed = self.attempt_started.elapsed();
                if self.policy.exhausted(self.failures, elapsed) {
                    error!(
                        failures = self.failures,
                        elapsed_secs = elapsed.as_secs(),
                        "[wc-03] Daemon unreachable, giving up"
                    );
                    self.drop_session();
                    self.apply(
                        ConnectionEvent::RetryExhausted,
                        format!(
                            "Daemon unreachable after {} attempts: {reason}",
                            self.failures
                        ),
                    )
                    .await;
                    return Step::Idle;
                }
                let delay = self.policy.backoff(self.failures);
                debug!(
                    failures = self.failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "[wc-03] Daemon not reachable yet"
                );
                self.apply(
                    ConnectionEvent::RpcUnreachable,
                    format!(
                        "Connecting (attempt {}/{}): {reason}",
                        self.failures + 1,
                        self.policy.max_attempts
                    ),
                )
                .await;
                Step::After(delay)
            }
            Err(RpcError::Cancelled) => Step::Idle,
        }
    }

    async fn handle_exit(&mut self, exit: DaemonExit) {
        self.owns_daemon = false;
        self.drop_session();

        if exit.kind == ExitKind::Misconfiguration {
            self.fail(FailureReason::Config, exit.to_string()).await;
            return;
        }

        let restart = self
            .supervisor
            .as_mut()
            .is_some_and(|supervisor| supervisor.should_restart(&exit));
        if restart {
            warn!(exit = %exit.summary(), "[wc-03] Daemon exited, restarting");
            // The exited daemon was ours; go straight to launching.
            self.probed = true;
            self.apply(
                ConnectionEvent::DaemonExited { restart: true },
                format!("Daemon {}, restarting", exit.summary()),
            )
            .await;
        } else {
            error!(exit = %exit, "[wc-03] Daemon exited");
            self.apply(ConnectionEvent::DaemonExited { restart: false }, exit.to_string())
                .await;
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn load_conf(config: &ConnectionConfig) -> Result<DaemonConf, String> {
        let Some(datadir) = config.datadir.as_ref() else {
            return Err("a data directory is required to locate the daemon conf".into());
        };
        DaemonConf::load(&datadir.join(CONF_FILE_NAME)).map_err(|e| e.to_string())
    }

    /// Resolve endpoint and credentials and create a fresh session.
    fn open_session(
        &mut self,
        config: &ConnectionConfig,
        conf: Option<&DaemonConf>,
    ) -> Result<(), (FailureReason, String)> {
        let port = match conf {
            Some(conf) => config.port.or(conf.rpc_port).unwrap_or_else(|| {
                if conf.testnet {
                    conf.network().default_rpc_port()
                } else {
                    config.network.default_rpc_port()
                }
            }),
            None => config.port.unwrap_or_else(|| config.network.default_rpc_port()),
        };
        let endpoint = RpcEndpoint::new(config.rpc_host(), port);

        let credentials = config
            .credentials
            .clone()
            .filter(RpcCredentials::is_complete)
            .or_else(|| conf.and_then(DaemonConf::credentials))
            .ok_or_else(|| {
                (
                    FailureReason::Config,
                    "rpcuser/rpcpassword missing from the daemon conf".to_string(),
                )
            })?;

        if self.rejected.as_ref() == Some(&credentials) {
            return Err((
                FailureReason::Auth,
                "RPC credentials were rejected by the daemon; update them first".to_string(),
            ));
        }

        let session = self
            .sessions
            .create(&endpoint, &credentials, config.use_tor)
            .map_err(|e| (FailureReason::Config, e.to_string()))?;

        debug!(endpoint = %endpoint, user = credentials.username(), "[wc-03] Session created");
        self.drop_session();
        self.session = Some(session);
        self.endpoint = Some(endpoint);
        self.credentials = Some(credentials);
        Ok(())
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.endpoint = None;
    }

    fn reset_attempt(&mut self) {
        self.failures = 0;
        self.attempt_started = Instant::now();
    }

    fn set_detail(&self, detail: String) {
        self.status_tx.send_if_modified(|current| {
            current.detail = detail;
            false
        });
    }

    async fn fail(&mut self, reason: FailureReason, detail: impl Into<String>) -> Step {
        let detail = detail.into();
        error!(%reason, detail = %detail, "[wc-03] Connection failed");
        self.drop_session();
        self.apply(ConnectionEvent::Fail(reason), detail).await;
        Step::Idle
    }

    /// Feed one event and publish the outcome.
    async fn apply(&mut self, event: ConnectionEvent, detail: impl Into<String>) -> Transition {
        let detail = detail.into();
        let transition = self.fsm.process_event(event);

        if !transition.changed() {
            self.set_detail(detail);
            return transition;
        }

        info!(
            from = %transition.from,
            to = %transition.to,
            detail = %detail,
            "[wc-03] Connection status changed"
        );
        if transition.from.has_session() && !transition.to.has_session() {
            self.generation += 1;
        }

        let snapshot = StatusSnapshot::new(transition.to, detail);
        let published = snapshot.clone();
        self.status_tx.send_if_modified(move |current| {
            *current = published;
            true
        });
        self.publish_session();

        self.publisher
            .publish(WalletEvent::StatusChanged(snapshot.clone()))
            .await;
        if let ConnectionStatus::Error(reason) = transition.to {
            self.publisher
                .publish(WalletEvent::TerminalError {
                    source: component::CONNECTION,
                    reason: Some(reason),
                    message: snapshot.detail,
                })
                .await;
        }
        transition
    }

    /// Expose the session only while the status says one is established.
    fn publish_session(&self) {
        let current = if self.fsm.state().has_session() {
            self.session.clone()
        } else {
            None
        };
        self.session_tx.send_if_modified(move |slot| {
            let changed = slot.is_some() != current.is_some();
            *slot = current;
            changed
        });
    }
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.fsm.state())
            .field("generation", &self.generation)
            .field("failures", &self.failures)
            .field("owns_daemon", &self.owns_daemon)
            .finish_non_exhaustive()
    }
}
