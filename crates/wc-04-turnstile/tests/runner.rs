//! Migration runner task: connection gating, cancellation, shutdown.

use chrono::Utc;
use serde_json::json;
use shared_bus::{InMemoryEventBus, ShutdownController};
use shared_types::{Amount, ConnectionStatus, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wc_01_rpc_session::testing::ScriptedTransport;
use wc_01_rpc_session::{RpcError, RpcSession};
use wc_04_turnstile::testing::MemoryStore;
use wc_04_turnstile::{
    MigrationPhase, MigrationPlan, MigrationRequest, MigrationRunner, MigrationState,
    SourceBalance, SystemTimeSource, TurnstileConfig, TurnstileEngine, TurnstileError,
    TurnstileHandle,
};

const DEST: &str = "zs1destination";
const SRC: &str = "zcSourceA";
const WAIT: Duration = Duration::from_secs(5);

fn config() -> TurnstileConfig {
    TurnstileConfig {
        step_cap: Amount::from_coins_str("1.0").unwrap(),
        step_interval: Duration::from_millis(20),
        confirmation_poll_interval: Duration::from_millis(5),
        operation_poll_interval: Duration::from_millis(5),
        precondition_recheck: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        ..TurnstileConfig::default()
    }
}

fn scripted(balance: f64, sends: usize) -> Arc<ScriptedTransport> {
    let transport = ScriptedTransport::new();
    transport.set_default(
        "z_listunspent",
        Ok(json!([{"txid": "note-a", "address": SRC, "amount": balance, "confirmations": 6}])),
    );
    transport.set_default("z_getbalance", Ok(json!(balance)));
    transport.set_default("getnewaddress", Ok(json!("t1intermediate")));
    transport.set_default("gettransaction", Ok(json!({"txid": "x", "confirmations": 2})));
    transport.set_default("getinfo", Ok(json!({"blocks": 900, "connections": 6})));
    transport.set_default(
        "getblockchaininfo",
        Ok(json!({"blocks": 900, "headers": 900, "verificationprogress": 1.0})),
    );
    for i in 0..sends {
        transport.push("z_sendmany", Ok(json!(format!("opid-{i}"))));
        transport.push(
            "z_getoperationstatus",
            Ok(json!([{"id": format!("opid-{i}"), "status": "success", "result": {"txid": format!("tx-{i}")}}])),
        );
    }
    transport
}

struct Running {
    handle: TurnstileHandle,
    task: tokio::task::JoinHandle<()>,
    status: watch::Sender<StatusSnapshot>,
    shutdown: ShutdownController,
    store: Arc<MemoryStore>,
}

async fn spawn(
    transport: &Arc<ScriptedTransport>,
    store: Arc<MemoryStore>,
    status: ConnectionStatus,
) -> Running {
    let engine = TurnstileEngine::open(
        config(),
        store.clone(),
        Arc::new(SystemTimeSource),
        Arc::new(InMemoryEventBus::new()),
    )
    .await
    .unwrap();
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::new(status, "test"));
    let (_session_tx, session_rx) =
        watch::channel(Some(RpcSession::new(transport.clone())));
    let shutdown = ShutdownController::new();
    let (handle, task) = MigrationRunner::spawn(engine, status_rx, session_rx, shutdown.signal());
    Running {
        handle,
        task,
        status: status_tx,
        shutdown,
        store,
    }
}

async fn wait_for_phase(handle: &TurnstileHandle, wanted: impl Fn(&MigrationPhase) -> bool) {
    let mut rx = handle.snapshot_watch();
    tokio::time::timeout(WAIT, rx.wait_for(|s| wanted(&s.phase)))
        .await
        .expect("timed out waiting for migration phase")
        .unwrap();
}

#[tokio::test]
async fn test_runner_completes_migration() {
    let transport = scripted(3.0, 6);
    // One failed poll is retried after the retry delay.
    transport.push("gettransaction", Err(RpcError::Transport("timed out".into())));
    let run = spawn(&transport, MemoryStore::new(), ConnectionStatus::Connected).await;

    let plan = run
        .handle
        .begin(MigrationRequest::from_sources(DEST, vec![SRC.into()]))
        .await
        .unwrap();
    assert_eq!(plan.estimated_steps, 3);

    wait_for_phase(&run.handle, |p| *p == MigrationPhase::Completed).await;

    assert_eq!(transport.calls_to("z_sendmany"), 6);
    let snapshot = run.handle.snapshot();
    assert_eq!(snapshot.progress.current_step, 3);
    assert_eq!(snapshot.plan_id, Some(plan.id));
    assert!(run.store.stored().is_none());
    run.shutdown.trigger();
}

#[tokio::test]
async fn test_begin_requires_connection() {
    let transport = scripted(3.0, 0);
    let run = spawn(&transport, MemoryStore::new(), ConnectionStatus::Syncing).await;

    let err = run
        .handle
        .begin(MigrationRequest::from_sources(DEST, vec![SRC.into()]))
        .await
        .unwrap_err();

    assert_eq!(err, TurnstileError::NotConnected);
    assert_eq!(transport.total_calls(), 0);
    run.shutdown.trigger();
}

#[tokio::test]
async fn test_runner_holds_until_connected() {
    let transport = scripted(1.0, 2);
    let plan = MigrationPlan::new(
        DEST.into(),
        vec![SourceBalance {
            address: SRC.into(),
            balance: Amount::from_coins_str("1.0").unwrap(),
        }],
        Amount::from_coins_str("0.0001").unwrap(),
        Amount::from_coins_str("1.0").unwrap(),
        Duration::from_secs(1),
        Utc::now(),
    );
    let store = MemoryStore::with_state(MigrationState::locked(plan));
    let run = spawn(&transport, store, ConnectionStatus::Syncing).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.total_calls(), 0);
    assert_eq!(run.handle.snapshot().phase, MigrationPhase::Locked);

    run.status
        .send(StatusSnapshot::new(ConnectionStatus::Connected, "caught up"))
        .unwrap();
    wait_for_phase(&run.handle, |p| *p == MigrationPhase::Completed).await;
    assert_eq!(transport.calls_to("z_sendmany"), 2);
    run.shutdown.trigger();
}

#[tokio::test]
async fn test_cancel_interrupts_tick_in_progress() {
    let transport = scripted(3.0, 1);
    transport.set_delay("z_sendmany", Duration::from_secs(30));
    let run = spawn(&transport, MemoryStore::new(), ConnectionStatus::Connected).await;
    run.handle
        .begin(MigrationRequest::from_sources(DEST, vec![SRC.into()]))
        .await
        .unwrap();

    tokio::time::timeout(WAIT, async {
        while transport.calls_to("z_sendmany") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("send was never issued");

    tokio::time::timeout(WAIT, run.handle.cancel())
        .await
        .expect("cancel blocked on the tick")
        .unwrap();

    wait_for_phase(&run.handle, |p| *p == MigrationPhase::Idle).await;
    assert!(run.store.stored().is_none());
    assert!(matches!(
        run.handle.cancel().await,
        Err(TurnstileError::NothingTo(_))
    ));
    run.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_runner() {
    let transport = scripted(3.0, 0);
    let run = spawn(&transport, MemoryStore::new(), ConnectionStatus::Connected).await;

    run.shutdown.trigger();
    tokio::time::timeout(WAIT, run.task)
        .await
        .expect("runner did not stop")
        .unwrap();

    assert!(matches!(
        run.handle.reset().await,
        Err(TurnstileError::RunnerStopped)
    ));
}
