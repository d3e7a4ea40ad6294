//! # Embedded Daemon Flow
//!
//! The connection service task driving a supervised daemon end to end:
//!
//! 1. **Scenario B**: first run downloads every parameter file with
//!    monotonic progress, launches and connects; shutdown stops the daemon
//! 2. **Attach only**: with a conf present but nothing answering, the
//!    attempt ends `Unreachable` without a launch

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared_bus::{
        EventFilter, EventPublisher, EventTopic, InMemoryEventBus, ShutdownController,
        WalletEvent,
    };
    use shared_types::{ConnectionStatus, FailureReason};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;
    use wc_01_rpc_session::testing::ScriptedTransport;
    use wc_01_rpc_session::RpcError;
    use wc_02_daemon_supervisor::testing::{MockDownloader, MockLauncher};
    use wc_02_daemon_supervisor::{DaemonSupervisor, SupervisorConfig, PARAM_FILES};
    use wc_03_connection::testing::ScriptedSessionFactory;
    use wc_03_connection::{
        ConnectionConfig, ConnectionHandle, ConnectionService, ConnectionStateMachine,
        RetryPolicy,
    };

    const WAIT: Duration = Duration::from_secs(10);

    struct Rig {
        dir: TempDir,
        bus: Arc<InMemoryEventBus>,
        transport: Arc<ScriptedTransport>,
        launcher: Arc<MockLauncher>,
        downloader: Arc<MockDownloader>,
        handle: ConnectionHandle,
        task: tokio::task::JoinHandle<()>,
        shutdown: ShutdownController,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SupervisorConfig::new(
            dir.path().join("data"),
            dir.path().join("params"),
            dir.path().join("bin").join("commerciumd"),
        );
        config.shutdown_poll_interval = Duration::from_millis(5);
        config.shutdown_poll_attempts = 20;

        let bus = Arc::new(InMemoryEventBus::new());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let launcher = MockLauncher::new();
        let downloader = MockDownloader::new(96, 32);
        let supervisor = DaemonSupervisor::new(
            config,
            launcher.clone(),
            downloader.clone(),
            Arc::clone(&publisher),
        );

        let transport = ScriptedTransport::new();
        let factory = ScriptedSessionFactory::new(transport.clone());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            warmup_poll: Duration::from_millis(5),
            heartbeat_interval: Duration::from_millis(20),
            ..RetryPolicy::default()
        };
        let machine =
            ConnectionStateMachine::new(factory, Some(supervisor), publisher).with_policy(policy);
        let shutdown = ShutdownController::new();
        let (handle, task) = ConnectionService::spawn(machine, shutdown.signal());

        Rig {
            dir,
            bus,
            transport,
            launcher,
            downloader,
            handle,
            task,
            shutdown,
        }
    }

    async fn wait_for(handle: &ConnectionHandle, wanted: ConnectionStatus) {
        let mut rx = handle.status_watch();
        timeout(WAIT, rx.wait_for(|s| s.status == wanted))
            .await
            .expect("timed out waiting for status")
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_run_provisions_launches_and_stops_on_shutdown() {
        let rig = rig();
        let mut daemon_events = rig
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Daemon]));
        rig.transport
            .push("getinfo", Err(RpcError::Transport("refused".into())));
        rig.transport
            .set_default("getinfo", Ok(json!({"blocks": 500, "connections": 8})));
        rig.transport.set_default(
            "getblockchaininfo",
            Ok(json!({"blocks": 500, "headers": 500, "verificationprogress": 1.0})),
        );
        rig.transport
            .set_default("stop", Ok(json!("Commercium server stopping")));

        rig.handle
            .start(ConnectionConfig::embedded(rig.dir.path().join("data")))
            .await
            .unwrap();
        wait_for(&rig.handle, ConnectionStatus::Connected).await;

        assert_eq!(rig.launcher.launch_count(), 1);
        assert_eq!(rig.downloader.fetched().len(), PARAM_FILES.len());
        for file in PARAM_FILES {
            assert!(rig.dir.path().join("params").join(file).exists());
        }

        // Per file, bytes only grow; across files, the remaining count only shrinks.
        let progress: Vec<_> = daemon_events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                WalletEvent::ParamsProgress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        for pair in progress.windows(2) {
            assert!(pair[1].files_remaining <= pair[0].files_remaining);
            if pair[1].file == pair[0].file {
                assert!(pair[1].bytes_done >= pair[0].bytes_done);
            }
        }

        // The mock never exits on its own, so shutdown ends in a kill.
        let process = rig.launcher.last_handle().unwrap();
        rig.shutdown.trigger();
        timeout(WAIT, rig.task)
            .await
            .expect("service did not stop")
            .unwrap();

        assert_eq!(rig.transport.calls_to("stop"), 1);
        assert!(process.was_killed());
        assert_eq!(rig.handle.status().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_attach_only_never_launches() {
        let rig = rig();
        let datadir = rig.dir.path().join("data");
        std::fs::create_dir_all(&datadir).unwrap();
        std::fs::write(
            datadir.join("commercium.conf"),
            "rpcuser=alice\nrpcpassword=hunter2\nrpcport=12019\n",
        )
        .unwrap();
        rig.transport
            .set_default("getinfo", Err(RpcError::Transport("refused".into())));

        let mut config = ConnectionConfig::embedded(rig.dir.path().join("data"));
        config.no_embedded = true;
        rig.handle.start(config).await.unwrap();
        wait_for(
            &rig.handle,
            ConnectionStatus::Error(FailureReason::Unreachable),
        )
        .await;

        assert_eq!(rig.launcher.launch_count(), 0);
        assert!(rig.downloader.fetched().is_empty());
        rig.shutdown.trigger();
    }
}
