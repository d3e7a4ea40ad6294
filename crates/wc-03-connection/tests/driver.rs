//! Connection driver tests against scripted RPC, launcher and downloader.

use serde_json::{json, Value};
use shared_bus::{EventFilter, EventPublisher, EventTopic, InMemoryEventBus, Subscription, WalletEvent};
use shared_types::{ConnectionStatus, FailureReason};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wc_01_rpc_session::testing::ScriptedTransport;
use wc_01_rpc_session::{RpcCredentials, RpcError};
use wc_02_daemon_supervisor::testing::{MockDownloader, MockLauncher};
use wc_02_daemon_supervisor::{DaemonSupervisor, SupervisorConfig, PARAM_FILES};
use wc_03_connection::testing::ScriptedSessionFactory;
use wc_03_connection::{
    ConnectionConfig, ConnectionError, ConnectionStateMachine, RetryPolicy, Step,
};

fn getinfo(peers: u32) -> Value {
    json!({"version": 2_000_150, "blocks": 500, "connections": peers})
}

fn chain(blocks: u64, headers: u64) -> Value {
    json!({
        "chain": "main",
        "blocks": blocks,
        "headers": headers,
        "verificationprogress": 1.0
    })
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        max_duration: Duration::from_secs(30),
        warmup_timeout: Duration::from_secs(5),
        warmup_poll: Duration::from_millis(5),
        heartbeat_interval: Duration::from_millis(20),
    }
}

fn manual() -> ConnectionConfig {
    ConnectionConfig::manual("127.0.0.1", 8232, RpcCredentials::new("alice", "hunter2"))
}

struct Harness {
    dir: TempDir,
    bus: Arc<InMemoryEventBus>,
    transport: Arc<ScriptedTransport>,
    factory: Arc<ScriptedSessionFactory>,
    launcher: Arc<MockLauncher>,
    downloader: Arc<MockDownloader>,
    machine: ConnectionStateMachine,
}

impl Harness {
    fn new(max_restarts: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SupervisorConfig::new(
            dir.path().join("data"),
            dir.path().join("params"),
            dir.path().join("bin").join("commerciumd"),
        );
        config.max_restarts = max_restarts;
        config.shutdown_poll_interval = Duration::from_millis(5);
        config.shutdown_poll_attempts = 5;

        let bus = Arc::new(InMemoryEventBus::new());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let launcher = MockLauncher::new();
        let downloader = MockDownloader::new(64, 32);
        let supervisor = DaemonSupervisor::new(
            config,
            launcher.clone(),
            downloader.clone(),
            publisher.clone(),
        );

        let transport = ScriptedTransport::new();
        let factory = ScriptedSessionFactory::new(transport.clone());
        let machine = ConnectionStateMachine::new(factory.clone(), Some(supervisor), publisher)
            .with_policy(fast_policy());

        Self {
            dir,
            bus,
            transport,
            factory,
            launcher,
            downloader,
            machine,
        }
    }

    fn embedded(&self) -> ConnectionConfig {
        ConnectionConfig::embedded(self.dir.path().join("data"))
    }

    fn install_params(&self) {
        let params = self.dir.path().join("params");
        std::fs::create_dir_all(&params).unwrap();
        for file in PARAM_FILES {
            std::fs::write(params.join(file), b"params").unwrap();
        }
    }

    fn healthy(&self, peers: u32, blocks: u64, headers: u64) {
        self.transport.set_default("getinfo", Ok(getinfo(peers)));
        self.transport
            .set_default("getblockchaininfo", Ok(chain(blocks, headers)));
    }

    fn status_events(&self) -> Subscription {
        self.bus
            .subscribe(EventFilter::topics(vec![EventTopic::Connection]))
    }

    /// Step until a session exists or the attempt ends.
    async fn drive(&mut self) -> ConnectionStatus {
        for _ in 0..200 {
            let state = self.machine.state();
            if state.has_session() || !state.is_active() {
                return state;
            }
            if let Step::After(delay) = self.machine.step().await {
                tokio::time::sleep(delay).await;
            }
        }
        panic!("driver did not settle");
    }
}

fn statuses(sub: &mut Subscription) -> Vec<ConnectionStatus> {
    sub.drain()
        .into_iter()
        .filter_map(|e| match e {
            WalletEvent::StatusChanged(s) => Some(s.status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_manual_config_missing_credentials_is_rejected_before_any_action() {
    let mut h = Harness::new(3);
    let mut sub = h.bus.subscribe(EventFilter::all());

    let mut config = manual();
    config.credentials = None;
    let err = h.machine.start(config).await.unwrap_err();

    assert!(matches!(err, ConnectionError::Config(_)));
    assert_eq!(h.machine.state(), ConnectionStatus::Disconnected);
    assert_eq!(h.transport.total_calls(), 0);
    assert!(h.factory.created().is_empty());
    assert!(sub.drain().is_empty());
}

#[tokio::test]
async fn test_transport_failures_below_cap_still_connect() {
    let mut h = Harness::new(3);
    let mut sub = h.status_events();
    for _ in 0..3 {
        h.transport
            .push("getinfo", Err(RpcError::Transport("connection refused".into())));
    }
    h.healthy(8, 500, 500);

    let snapshot = h.machine.start(manual()).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(h.transport.calls_to("getinfo"), 4);
    assert_eq!(
        statuses(&mut sub),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected
        ]
    );
    assert!(h.machine.session().is_some());
}

#[tokio::test]
async fn test_peers_and_lag_pass_through_intermediate_states() {
    let mut h = Harness::new(3);
    let mut sub = h.status_events();
    h.healthy(0, 480, 500);

    let snapshot = h.machine.start(manual()).await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::WaitingForPeers);

    h.healthy(4, 480, 500);
    h.machine.monitor_tick().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Syncing);
    assert!(h.machine.status().detail.contains("20 blocks behind"));

    h.healthy(4, 495, 500);
    h.machine.monitor_tick().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Syncing);

    h.healthy(4, 500, 500);
    h.machine.monitor_tick().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Connected);

    assert_eq!(
        statuses(&mut sub),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::WaitingForPeers,
            ConnectionStatus::Syncing,
            ConnectionStatus::Connected
        ]
    );
}

#[tokio::test]
async fn test_auth_failure_makes_exactly_one_attempt() {
    let mut h = Harness::new(3);
    let mut errors = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Errors]));
    h.transport
        .set_default("getinfo", Err(RpcError::Auth { status: 401 }));

    let snapshot = h.machine.start(manual()).await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Error(FailureReason::Auth));
    assert_eq!(h.transport.total_calls(), 1);

    match errors.try_recv().unwrap() {
        Some(WalletEvent::TerminalError { reason, .. }) => {
            assert_eq!(reason, Some(FailureReason::Auth));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Same credentials again: refused without touching the daemon.
    let err = h.machine.start(manual()).await.unwrap_err();
    assert_eq!(err, ConnectionError::CredentialsRejected);
    assert_eq!(h.transport.total_calls(), 1);
    assert_eq!(
        h.machine.state(),
        ConnectionStatus::Error(FailureReason::Auth)
    );

    // New credentials are accepted.
    h.healthy(8, 500, 500);
    let fixed =
        ConnectionConfig::manual("127.0.0.1", 8232, RpcCredentials::new("alice", "correct"));
    let snapshot = h.machine.start(fixed).await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_retry_exhaustion_is_unreachable() {
    let mut h = Harness::new(3);
    h.machine = ConnectionStateMachine::new(h.factory.clone(), None, h.bus.clone())
        .with_policy(RetryPolicy {
            max_attempts: 3,
            ..fast_policy()
        });
    h.transport
        .set_default("getinfo", Err(RpcError::Transport("refused".into())));

    let snapshot = h.machine.start(manual()).await.unwrap();

    assert_eq!(
        snapshot.status,
        ConnectionStatus::Error(FailureReason::Unreachable)
    );
    assert_eq!(h.transport.calls_to("getinfo"), 3);
    assert!(h.machine.session().is_none());
}

#[tokio::test]
async fn test_warm_up_reentry_emits_nothing() {
    let mut h = Harness::new(3);
    let mut sub = h.status_events();
    for _ in 0..3 {
        h.transport.push(
            "getinfo",
            Err(RpcError::WarmingUp {
                message: "Loading block index...".into(),
            }),
        );
    }
    h.healthy(8, 500, 500);

    let snapshot = h.machine.start(manual()).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(
        statuses(&mut sub),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected
        ]
    );
}

#[tokio::test]
async fn test_embedded_launch_downloads_missing_params_first() {
    let mut h = Harness::new(3);
    let mut sub = h.status_events();
    // Probe finds nothing listening; the launched daemon then answers.
    h.transport
        .push("getinfo", Err(RpcError::Transport("refused".into())));
    h.healthy(8, 500, 500);

    let config = h.embedded();
    let snapshot = h.machine.start(config).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(
        statuses(&mut sub),
        vec![
            ConnectionStatus::Starting,
            ConnectionStatus::WaitingForParams,
            ConnectionStatus::Starting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected
        ]
    );
    assert_eq!(h.downloader.fetched().len(), PARAM_FILES.len());
    assert_eq!(h.launcher.launch_count(), 1);
    assert!(h.machine.owns_daemon());

    let created = h.factory.created();
    let last = created.last().unwrap();
    assert_eq!(last.credentials.username(), "cmm-qt-wallet");
    assert_eq!(last.endpoint.port, 12019);
}

#[tokio::test]
async fn test_embedded_attaches_to_running_daemon() {
    let mut h = Harness::new(3);
    h.healthy(8, 500, 500);

    let config = h.embedded();
    let snapshot = h.machine.start(config).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(h.launcher.launch_count(), 0);
    assert!(h.downloader.fetched().is_empty());
    assert!(!h.machine.owns_daemon());
}

#[tokio::test]
async fn test_embedded_auth_failure_makes_exactly_one_attempt() {
    let mut h = Harness::new(3);
    h.install_params();
    let mut sub = h.status_events();
    h.transport
        .set_default("getinfo", Err(RpcError::Auth { status: 401 }));
    h.transport
        .set_default("getblockchaininfo", Err(RpcError::Auth { status: 401 }));

    let config = h.embedded();
    let snapshot = h.machine.start(config).await.unwrap();

    assert_eq!(snapshot.status, ConnectionStatus::Error(FailureReason::Auth));
    assert_eq!(h.transport.total_calls(), 1);
    assert_eq!(h.launcher.launch_count(), 0);
    assert!(!h.machine.owns_daemon());
    assert_eq!(
        statuses(&mut sub),
        vec![
            ConnectionStatus::Starting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Error(FailureReason::Auth)
        ]
    );
}

#[tokio::test]
async fn test_forking_daemon_conf_is_config_error() {
    let mut h = Harness::new(3);
    let datadir = h.dir.path().join("data");
    std::fs::create_dir_all(&datadir).unwrap();
    std::fs::write(
        datadir.join("commercium.conf"),
        "rpcuser=u\nrpcpassword=p\ndaemon=1\n",
    )
    .unwrap();

    let config = h.embedded();
    let snapshot = h.machine.start(config).await.unwrap();

    assert_eq!(
        snapshot.status,
        ConnectionStatus::Error(FailureReason::Config)
    );
    assert!(snapshot.detail.contains("daemon=1"));
    assert_eq!(h.launcher.launch_count(), 0);
    assert_eq!(h.transport.total_calls(), 0);
}

#[tokio::test]
async fn test_crash_restarts_daemon_then_surfaces_when_budget_spent() {
    let mut h = Harness::new(1);
    h.install_params();
    h.transport
        .push("getinfo", Err(RpcError::Transport("refused".into())));
    h.healthy(8, 500, 500);

    let config = h.embedded();
    h.machine.start(config).await.unwrap();
    assert_eq!(h.machine.state(), ConnectionStatus::Connected);

    // First crash: relaunched within budget, no probe for a foreign daemon.
    let calls_before = h.transport.calls_to("getinfo");
    h.launcher.last_handle().unwrap().exit(Some(139));
    h.machine.monitor_tick().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Starting);
    assert!(h.machine.session().is_none());

    assert_eq!(h.drive().await, ConnectionStatus::Connected);
    assert_eq!(h.launcher.launch_count(), 2);
    assert_eq!(h.transport.calls_to("getinfo"), calls_before + 1);

    // Healthy again restores the budget, so spend it explicitly: two crashes
    // without reaching a session.
    h.transport
        .set_default("getinfo", Err(RpcError::Transport("refused".into())));
    h.launcher.last_handle().unwrap().exit(Some(139));
    h.machine.monitor_tick().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Starting);
    h.machine.step().await;
    assert_eq!(h.machine.state(), ConnectionStatus::Connecting);

    let mut errors = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Errors]));
    h.launcher.last_handle().unwrap().exit(None);
    h.machine.step().await;
    assert_eq!(
        h.machine.state(),
        ConnectionStatus::Error(FailureReason::Crashed)
    );
    assert!(matches!(
        errors.try_recv().unwrap(),
        Some(WalletEvent::TerminalError {
            reason: Some(FailureReason::Crashed),
            ..
        })
    ));
    assert_eq!(h.launcher.launch_count(), 3);
}

#[tokio::test]
async fn test_stop_shuts_down_owned_daemon() {
    let mut h = Harness::new(3);
    h.install_params();
    h.transport
        .push("getinfo", Err(RpcError::Transport("refused".into())));
    h.healthy(8, 500, 500);
    h.transport
        .set_default("stop", Ok(json!("Commercium server stopping")));

    let config = h.embedded();
    h.machine.start(config).await.unwrap();
    let handle = h.launcher.last_handle().unwrap();
    handle.exit_after_polls(1, Some(0));

    h.machine.stop().await;

    assert_eq!(h.machine.state(), ConnectionStatus::Disconnected);
    assert_eq!(h.transport.calls_to("stop"), 1);
    assert!(!handle.was_killed());
    assert!(!h.machine.owns_daemon());
    assert!(h.machine.session().is_none());
}

#[tokio::test]
async fn test_heartbeat_failure_reconnects_and_stale_results_are_dropped() {
    let mut h = Harness::new(3);
    h.healthy(8, 500, 500);
    h.machine.start(manual()).await.unwrap();

    let beat = h.machine.heartbeat_request().unwrap();
    let stale = h.machine.heartbeat_request().unwrap();
    assert_eq!(beat.generation, stale.generation);

    let applied = h
        .machine
        .apply_heartbeat(beat.generation, Err(RpcError::Transport("reset".into())))
        .await;
    assert!(applied);
    assert_eq!(h.machine.state(), ConnectionStatus::Connecting);
    assert!(h.machine.session().is_none());

    let applied = h
        .machine
        .apply_heartbeat(stale.generation, Ok(Default::default()))
        .await;
    assert!(!applied);
    assert_eq!(h.machine.state(), ConnectionStatus::Connecting);

    // The same session is reused for the reconnect.
    assert_eq!(h.drive().await, ConnectionStatus::Connected);
    assert_eq!(h.factory.created().len(), 1);
}

#[tokio::test]
async fn test_start_while_active_is_refused() {
    let mut h = Harness::new(3);
    h.healthy(8, 500, 500);
    h.machine.start(manual()).await.unwrap();

    let err = h.machine.start(manual()).await.unwrap_err();
    assert_eq!(
        err,
        ConnectionError::AlreadyActive(ConnectionStatus::Connected)
    );
}
