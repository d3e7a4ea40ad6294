//! Ports (hexagonal architecture).

use crate::error::RpcResult;
use async_trait::async_trait;
use serde_json::Value;

/// Raw JSON-RPC call transport.
///
/// One call, one answer, no retries. Implementations classify failures into
/// [`crate::RpcError`] so callers can decide what is transient.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}
