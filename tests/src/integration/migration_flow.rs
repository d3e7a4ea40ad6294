//! # Connection + Migration Flow
//!
//! The migration runner fed by a live connection service, both sharing one
//! scripted daemon:
//!
//! 1. **Scenario D**: 3.0 split into three capped steps, ending `Completed`
//! 2. **Connection gating**: a stopped connection freezes the plan until
//!    the wallet reconnects

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared_bus::{
        EventFilter, EventPublisher, EventTopic, InMemoryEventBus, ShutdownController,
        Subscription, WalletEvent,
    };
    use shared_types::{Amount, ConnectionStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use wc_01_rpc_session::testing::ScriptedTransport;
    use wc_01_rpc_session::RpcCredentials;
    use wc_03_connection::testing::ScriptedSessionFactory;
    use wc_03_connection::{
        ConnectionConfig, ConnectionHandle, ConnectionService, ConnectionStateMachine,
        RetryPolicy,
    };
    use wc_04_turnstile::testing::MemoryStore;
    use wc_04_turnstile::{
        MigrationPhase, MigrationRequest, MigrationRunner, SystemTimeSource, TurnstileConfig,
        TurnstileEngine, TurnstileHandle,
    };

    const DEST: &str = "zs1destination";
    const SRC: &str = "zcSourceA";
    const WAIT: Duration = Duration::from_secs(10);

    // =========================================================================
    // FIXTURES
    // =========================================================================

    struct Wallet {
        bus: Arc<InMemoryEventBus>,
        transport: Arc<ScriptedTransport>,
        connection: ConnectionHandle,
        turnstile: TurnstileHandle,
        store: Arc<MemoryStore>,
        shutdown: ShutdownController,
    }

    fn manual() -> ConnectionConfig {
        ConnectionConfig::manual("127.0.0.1", 8232, RpcCredentials::new("alice", "hunter2"))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            warmup_poll: Duration::from_millis(5),
            heartbeat_interval: Duration::from_millis(25),
            ..RetryPolicy::default()
        }
    }

    fn turnstile_config(step_interval: Duration) -> TurnstileConfig {
        TurnstileConfig {
            step_cap: Amount::from_coins_str("1.0").unwrap(),
            step_interval,
            confirmation_poll_interval: Duration::from_millis(5),
            operation_poll_interval: Duration::from_millis(5),
            precondition_recheck: Duration::from_millis(10),
            retry_delay: Duration::from_millis(10),
            ..TurnstileConfig::default()
        }
    }

    /// A synced daemon holding `balance` confirmed coins at `SRC`, scripted
    /// for `sends` successful hops.
    fn daemon(balance: f64, sends: usize) -> Arc<ScriptedTransport> {
        let transport = ScriptedTransport::new();
        transport.set_default("getinfo", Ok(json!({"blocks": 900, "connections": 6})));
        transport.set_default(
            "getblockchaininfo",
            Ok(json!({"blocks": 900, "headers": 900, "verificationprogress": 1.0})),
        );
        transport.set_default(
            "z_listunspent",
            Ok(json!([{"txid": "note-a", "address": SRC, "amount": balance, "confirmations": 6}])),
        );
        transport.set_default("z_getbalance", Ok(json!(balance)));
        transport.set_default("getnewaddress", Ok(json!("t1intermediate")));
        transport.set_default("gettransaction", Ok(json!({"txid": "x", "confirmations": 3})));
        for i in 0..sends {
            transport.push("z_sendmany", Ok(json!(format!("opid-{i}"))));
            transport.push(
                "z_getoperationstatus",
                Ok(json!([{"id": format!("opid-{i}"), "status": "success", "result": {"txid": format!("tx-{i}")}}])),
            );
        }
        transport
    }

    async fn wallet(transport: Arc<ScriptedTransport>, step_interval: Duration) -> Wallet {
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let shutdown = ShutdownController::new();

        let factory = ScriptedSessionFactory::new(transport.clone());
        let machine = ConnectionStateMachine::new(factory, None, Arc::clone(&publisher))
            .with_policy(policy());
        let (connection, _task) = ConnectionService::spawn(machine, shutdown.signal());

        let store = MemoryStore::new();
        let engine = TurnstileEngine::open(
            turnstile_config(step_interval),
            store.clone(),
            Arc::new(SystemTimeSource),
            publisher,
        )
        .await
        .unwrap();
        let (turnstile, _task) = MigrationRunner::spawn(
            engine,
            connection.status_watch(),
            connection.session_watch(),
            shutdown.signal(),
        );

        Wallet {
            bus,
            transport,
            connection,
            turnstile,
            store,
            shutdown,
        }
    }

    async fn connect(wallet: &Wallet) {
        wallet.connection.start(manual()).await.unwrap();
        let mut status = wallet.connection.status_watch();
        timeout(WAIT, status.wait_for(|s| s.status == ConnectionStatus::Connected))
            .await
            .expect("never connected")
            .unwrap();
    }

    async fn wait_for_phase(turnstile: &TurnstileHandle, wanted: impl Fn(&MigrationPhase) -> bool) {
        let mut rx = turnstile.snapshot_watch();
        timeout(WAIT, rx.wait_for(|s| wanted(&s.phase)))
            .await
            .expect("timed out waiting for migration phase")
            .unwrap();
    }

    fn migration_events(sub: &mut Subscription) -> Vec<WalletEvent> {
        sub.drain()
    }

    // =========================================================================
    // SCENARIO D
    // =========================================================================

    #[tokio::test]
    async fn test_three_coin_migration_completes_through_live_connection() {
        let w = wallet(daemon(3.0, 6), Duration::from_millis(20)).await;
        let mut events = w
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Migration]));
        connect(&w).await;

        let plan = w
            .turnstile
            .begin(MigrationRequest::from_sources(DEST, vec![SRC.into()]))
            .await
            .unwrap();
        assert_eq!(plan.estimated_steps, 3);

        wait_for_phase(&w.turnstile, |p| *p == MigrationPhase::Completed).await;

        assert_eq!(w.transport.calls_to("z_sendmany"), 6);
        assert!(w.store.stored().is_none());

        let events = migration_events(&mut events);
        let txids: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                WalletEvent::MigrationStepRecorded { txid, .. } => Some(txid.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(txids, (0..6).map(|i| format!("tx-{i}")).collect::<Vec<_>>());

        let scheduled = events
            .iter()
            .filter(|e| matches!(e, WalletEvent::MigrationProgress(p) if p.next_step_eta.is_some()))
            .count();
        assert_eq!(scheduled, 2, "one interval wait between each pair of steps");

        assert!(matches!(
            events.last(),
            Some(WalletEvent::MigrationFinished { failed: None, .. })
        ));
        w.shutdown.trigger();
    }

    // =========================================================================
    // CONNECTION GATING
    // =========================================================================

    #[tokio::test]
    async fn test_migration_waits_while_disconnected() {
        let w = wallet(daemon(2.0, 4), Duration::from_millis(150)).await;
        connect(&w).await;
        w.turnstile
            .begin(MigrationRequest::from_sources(DEST, vec![SRC.into()]))
            .await
            .unwrap();

        wait_for_phase(&w.turnstile, |p| {
            matches!(p, MigrationPhase::WaitingInterval { .. })
        })
        .await;
        w.connection.stop().await.unwrap();
        assert_eq!(w.connection.status().status, ConnectionStatus::Disconnected);

        // Well past the interval: nothing moves without a connection.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(w.transport.calls_to("z_sendmany"), 2);
        assert!(matches!(
            w.turnstile.snapshot().phase,
            MigrationPhase::WaitingInterval { .. }
        ));
        assert!(w.store.stored().is_some());

        connect(&w).await;
        wait_for_phase(&w.turnstile, |p| *p == MigrationPhase::Completed).await;
        assert_eq!(w.transport.calls_to("z_sendmany"), 4);
        assert_eq!(w.turnstile.snapshot().progress.current_step, 2);
        w.shutdown.trigger();
    }
}
