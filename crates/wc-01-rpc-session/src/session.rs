//! # RPC Session
//!
//! A cheap, clonable handle over an [`RpcTransport`] with typed wrappers for
//! the daemon methods the wallet core uses.
//!
//! Closing a session is final: calls made afterwards fail with
//! [`RpcError::Cancelled`], and so does any call that was in flight when the
//! session was closed, even if the daemon's answer arrives later.

use crate::domain::{
    BlockchainInfo, NodeInfo, OperationStatus, Recipient, ShieldedNote, SyncInfo,
    TransparentUtxo, WalletTransaction,
};
use crate::error::{RpcError, RpcResult};
use crate::ports::RpcTransport;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared_types::Amount;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Typed handle to the daemon.
#[derive(Clone)]
pub struct RpcSession {
    transport: Arc<dyn RpcTransport>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSession")
            .field("target", &self.transport.describe())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RpcSession {
    #[must_use]
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close the session. Every clone observes it.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(target = %self.transport.describe(), "RPC session closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Issue a raw call.
    pub async fn call_raw(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        if self.is_closed() {
            return Err(RpcError::Cancelled);
        }
        let result = self.transport.call(method, params).await;
        if self.is_closed() {
            return Err(RpcError::Cancelled);
        }
        result
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> RpcResult<T> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::Protocol(format!("{method}: unexpected reply shape: {e}")))
    }

    // =========================================================================
    // Node status
    // =========================================================================

    pub async fn get_info(&self) -> RpcResult<NodeInfo> {
        self.call("getinfo", vec![]).await
    }

    pub async fn get_blockchain_info(&self) -> RpcResult<BlockchainInfo> {
        self.call("getblockchaininfo", vec![]).await
    }

    /// Peers and sync lag in one snapshot.
    pub async fn sync_info(&self) -> RpcResult<SyncInfo> {
        let info = self.get_info().await?;
        let chain = self.get_blockchain_info().await?;
        Ok(SyncInfo {
            blocks: chain.blocks,
            peers: info.connections,
            lag: chain.lag(),
        })
    }

    pub async fn get_network_sol_ps(&self) -> RpcResult<f64> {
        self.call("getnetworksolps", vec![]).await
    }

    /// Ask the daemon to shut down.
    pub async fn stop(&self) -> RpcResult<String> {
        let value = self.call_raw("stop", vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // =========================================================================
    // Addresses & balances
    // =========================================================================

    pub async fn z_list_addresses(&self) -> RpcResult<Vec<String>> {
        self.call("z_listaddresses", vec![]).await
    }

    pub async fn z_get_balance(&self, address: &str, min_conf: u32) -> RpcResult<Amount> {
        let value: f64 = self.call("z_getbalance", vec![json!(address), json!(min_conf)]).await?;
        Amount::from_coins_f64(value).map_err(|e| RpcError::Protocol(e.to_string()))
    }

    /// Shielded notes with `min_conf..=9999999` confirmations, optionally
    /// restricted to the given addresses.
    pub async fn z_list_unspent(
        &self,
        min_conf: u32,
        addresses: &[String],
    ) -> RpcResult<Vec<ShieldedNote>> {
        let mut params = vec![json!(min_conf), json!(9_999_999)];
        if !addresses.is_empty() {
            params.push(json!(false));
            params.push(json!(addresses));
        }
        self.call("z_listunspent", params).await
    }

    pub async fn list_unspent(&self, min_conf: u32) -> RpcResult<Vec<TransparentUtxo>> {
        self.call("listunspent", vec![json!(min_conf)]).await
    }

    pub async fn get_new_address(&self) -> RpcResult<String> {
        self.call("getnewaddress", vec![]).await
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Submit a shielded send. Returns the async operation id.
    pub async fn z_send_many(
        &self,
        from: &str,
        recipients: &[Recipient],
        min_conf: u32,
        fee: Amount,
    ) -> RpcResult<String> {
        let outputs: Vec<Value> = recipients
            .iter()
            .map(|r| json!({"address": r.address, "amount": r.amount.to_rpc_string()}))
            .collect();
        self.call(
            "z_sendmany",
            vec![
                json!(from),
                Value::Array(outputs),
                json!(min_conf),
                json!(fee.to_rpc_string()),
            ],
        )
        .await
    }

    /// Status of one async operation, `None` if the daemon forgot it.
    pub async fn z_get_operation_status(&self, opid: &str) -> RpcResult<Option<OperationStatus>> {
        let statuses: Vec<OperationStatus> = self
            .call("z_getoperationstatus", vec![json!([opid])])
            .await?;
        Ok(statuses.into_iter().find(|s| s.id == opid))
    }

    pub async fn get_transaction(&self, txid: &str) -> RpcResult<WalletTransaction> {
        self.call("gettransaction", vec![json!(txid)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Canned {
        replies: Mutex<VecDeque<RpcResult<Value>>>,
        seen: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl Canned {
        fn new(replies: Vec<RpcResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RpcTransport for Canned {
        async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
            self.seen.lock().push((method.to_string(), params));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or(Err(RpcError::Transport("no reply".into())))
        }

        fn describe(&self) -> String {
            "canned".into()
        }
    }

    #[tokio::test]
    async fn test_sync_info_combines_calls() {
        let canned = Canned::new(vec![
            Ok(json!({"blocks": 90, "connections": 4, "testnet": false})),
            Ok(json!({"blocks": 90, "headers": 100, "verificationprogress": 0.9})),
        ]);
        let session = RpcSession::new(canned.clone());

        let info = session.sync_info().await.unwrap();
        assert_eq!(info, SyncInfo { blocks: 90, peers: 4, lag: 10 });

        let seen = canned.seen.lock();
        assert_eq!(seen[0].0, "getinfo");
        assert_eq!(seen[1].0, "getblockchaininfo");
    }

    #[tokio::test]
    async fn test_z_send_many_formats_amounts() {
        let canned = Canned::new(vec![Ok(json!("opid-abc"))]);
        let session = RpcSession::new(canned.clone());

        let opid = session
            .z_send_many(
                "zcsource",
                &[Recipient {
                    address: "t1mid".into(),
                    amount: Amount::from_zat(99_990_000),
                }],
                1,
                Amount::from_zat(10_000),
            )
            .await
            .unwrap();
        assert_eq!(opid, "opid-abc");

        let seen = canned.seen.lock();
        let (method, params) = &seen[0];
        assert_eq!(method, "z_sendmany");
        assert_eq!(params[1][0]["amount"], "0.99990000");
        assert_eq!(params[3], "0.00010000");
    }

    #[tokio::test]
    async fn test_closed_session_refuses_calls() {
        let canned = Canned::new(vec![Ok(json!({}))]);
        let session = RpcSession::new(canned.clone());
        let clone = session.clone();

        session.close();
        assert_eq!(clone.get_info().await.unwrap_err(), RpcError::Cancelled);
        assert!(canned.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_protocol_error() {
        let canned = Canned::new(vec![Ok(json!("not an object"))]);
        let session = RpcSession::new(canned);
        assert!(matches!(
            session.get_info().await,
            Err(RpcError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_operation_status_lookup() {
        let canned = Canned::new(vec![Ok(json!([
            {"id": "opid-1", "status": "executing"}
        ]))]);
        let session = RpcSession::new(canned);
        let status = session.z_get_operation_status("opid-1").await.unwrap();
        assert!(status.is_some());
    }
}
