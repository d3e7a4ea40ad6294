//! # Runtime over HTTP
//!
//! The full `AppContext` against a mock daemon speaking JSON-RPC:
//!
//! 1. **Migration from configuration**: connect in manual mode, run the
//!    requested migration to completion, shut down cleanly
//! 2. **Scenario C**: rejected credentials end in `Error(auth)` after exactly
//!    one request
//! 3. **Scenario A**: incomplete manual settings never build a context

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use shared_types::{ConnectionStatus, FailureReason};
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::timeout;
    use wallet_runtime::{AppContext, WalletConfig};
    use wc_04_turnstile::{plan_file_name, MigrationPhase};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEST: &str = "zs1destination";
    const SRC: &str = "zcSourceA";
    const WAIT: Duration = Duration::from_secs(15);

    fn manual_config(server: &MockServer, datadir: &Path) -> WalletConfig {
        let addr = server.address();
        let mut config = WalletConfig::default();
        config.connection.embedded = false;
        config.connection.host = Some(addr.ip().to_string());
        config.connection.port = Some(addr.port());
        config.connection.rpc_user = Some("alice".into());
        config.connection.rpc_password = Some("hunter2".into());
        config.connection.datadir = Some(datadir.to_path_buf());
        config.connection.request_timeout_secs = 5;
        config.retry.max_attempts = 3;
        config.retry.base_delay_secs = 0;
        config.retry.heartbeat_interval_secs = 1;
        config
    }

    async fn answer(server: &MockServer, rpc: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": rpc})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": result,
                "error": null,
                "id": 1
            })))
            .mount(server)
            .await;
    }

    async fn synced_daemon(server: &MockServer) {
        answer(server, "getinfo", json!({"version": 2_000_351, "blocks": 900, "connections": 8})).await;
        answer(
            server,
            "getblockchaininfo",
            json!({"chain": "main", "blocks": 900, "headers": 900, "verificationprogress": 1.0}),
        )
        .await;
    }

    #[tokio::test]
    async fn test_configured_migration_runs_to_completion() {
        let server = MockServer::start().await;
        synced_daemon(&server).await;
        answer(
            &server,
            "z_listunspent",
            json!([{"txid": "note-a", "address": SRC, "amount": 0.5, "confirmations": 6}]),
        )
        .await;
        answer(&server, "z_getbalance", json!(0.5)).await;
        answer(&server, "getnewaddress", json!("t1intermediate")).await;
        answer(&server, "z_sendmany", json!("opid-1")).await;
        answer(
            &server,
            "z_getoperationstatus",
            json!([{"id": "opid-1", "status": "success", "result": {"txid": "tx-1"}}]),
        )
        .await;
        answer(&server, "gettransaction", json!({"txid": "tx-1", "confirmations": 3})).await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = manual_config(&server, dir.path());
        config.turnstile.migrate_to = Some(DEST.into());
        config.turnstile.migrate_from = vec![SRC.into()];
        config.turnstile.operation_poll_secs = 0;
        config.turnstile.confirmation_poll_secs = 0;
        config.turnstile.step_interval_secs = 0;
        config.turnstile.retry_delay_secs = 1;

        let mut context = AppContext::new(config).unwrap();
        context.start().await.unwrap();

        let connection = context.connection().unwrap().clone();
        let mut status = connection.status_watch();
        timeout(WAIT, status.wait_for(|s| s.status == ConnectionStatus::Connected))
            .await
            .expect("never connected")
            .unwrap();

        let turnstile = context.turnstile().unwrap().clone();
        let mut snapshot = turnstile.snapshot_watch();
        timeout(WAIT, snapshot.wait_for(|s| s.phase == MigrationPhase::Completed))
            .await
            .expect("migration did not complete")
            .unwrap();

        // 0.5 fits under one step cap: one step, two hops.
        let sends = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| {
                serde_json::from_slice::<Value>(&r.body)
                    .map(|body| body["method"] == "z_sendmany")
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(sends, 2);
        assert!(!dir
            .path()
            .join(plan_file_name(shared_types::Network::Mainnet))
            .exists());

        timeout(WAIT, context.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_rejected_credentials_stop_after_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut context = AppContext::new(manual_config(&server, dir.path())).unwrap();
        context.start().await.unwrap();

        let connection = context.connection().unwrap().clone();
        let mut status = connection.status_watch();
        timeout(
            WAIT,
            status.wait_for(|s| s.status == ConnectionStatus::Error(FailureReason::Auth)),
        )
        .await
        .expect("auth failure never surfaced")
        .unwrap();
        drop(status);

        // No retries, no heartbeats.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);

        timeout(WAIT, context.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn test_incomplete_manual_settings_are_refused() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = manual_config(&server, dir.path());
        config.connection.port = None;

        assert!(AppContext::new(config).is_err());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
