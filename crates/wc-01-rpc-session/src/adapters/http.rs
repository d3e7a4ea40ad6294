//! HTTP JSON-RPC transport.

use crate::domain::{RpcCredentials, RpcEndpoint, TOR_SOCKS_PROXY};
use crate::error::{RpcError, RpcResult, RPC_IN_WARMUP};
use crate::ports::RpcTransport;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Default whole-request timeout. Some wallet calls (rescans, sends) are slow.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub endpoint: RpcEndpoint,
    pub credentials: RpcCredentials,
    /// Route through the local Tor SOCKS proxy.
    pub use_tor: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new(endpoint: RpcEndpoint, credentials: RpcCredentials) -> Self {
        Self {
            endpoint,
            credentials,
            use_tor: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_tor(mut self, use_tor: bool) -> Self {
        self.use_tor = use_tor;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// JSON-RPC 1.0 over HTTP with Basic auth.
pub struct HttpTransport {
    http_client: reqwest::Client,
    url: String,
    endpoint: RpcEndpoint,
    credentials: RpcCredentials,
    request_id: AtomicU64,
}

impl HttpTransport {
    /// Build a transport. Fails only if the HTTP client cannot be built
    /// (for example an unusable proxy URL).
    pub fn new(config: HttpTransportConfig) -> RpcResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout);

        if config.use_tor {
            let proxy = reqwest::Proxy::all(TOR_SOCKS_PROXY)
                .map_err(|e| RpcError::Transport(format!("invalid Tor proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http_client = builder
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            url: config.endpoint.url(),
            endpoint: config.endpoint,
            credentials: config.credentials,
            request_id: AtomicU64::new(1),
        })
    }

    fn classify_send_error(err: &reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            RpcError::Transport(format!("connection failed: {err}"))
        } else {
            RpcError::Transport(err.to_string())
        }
    }

    fn interpret(status: StatusCode, body: &[u8]) -> RpcResult<Value> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Auth {
                status: status.as_u16(),
            });
        }

        // The daemon reports RPC errors with HTTP 500 and a normal envelope,
        // so the body is parsed whatever the status code.
        let response: JsonRpcResponse = serde_json::from_slice(body).map_err(|e| {
            RpcError::Protocol(format!("HTTP {}: unparseable body: {e}", status.as_u16()))
        })?;

        match response.error {
            Some(err) if err.code == RPC_IN_WARMUP => Err(RpcError::WarmingUp {
                message: err.message,
            }),
            Some(err) => Err(RpcError::Application {
                code: err.code,
                message: err.message,
            }),
            None if !status.is_success() => Err(RpcError::Protocol(format!(
                "HTTP {} without error object",
                status.as_u16()
            ))),
            None => Ok(response.result),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params: &params,
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| RpcError::Protocol(e.to_string()))?;

        trace!(id, method, endpoint = %self.endpoint, "RPC request");

        let response = self
            .http_client
            .post(&self.url)
            .basic_auth(self.credentials.username(), Some(self.credentials.password()))
            .header(CONTENT_TYPE, "text/plain")
            .body(payload)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        let result = Self::interpret(status, &body);
        if let Err(err) = &result {
            debug!(id, method, error = %err, "RPC call failed");
        }
        result
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpret_auth() {
        assert_eq!(
            HttpTransport::interpret(StatusCode::UNAUTHORIZED, b""),
            Err(RpcError::Auth { status: 401 })
        );
    }

    #[test]
    fn test_interpret_warmup() {
        let body = json!({"result": null, "error": {"code": -28, "message": "Loading block index..."}, "id": 1});
        let err = HttpTransport::interpret(
            StatusCode::INTERNAL_SERVER_ERROR,
            body.to_string().as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::WarmingUp { .. }));
    }

    #[test]
    fn test_interpret_application_error() {
        let body = json!({"result": null, "error": {"code": -5, "message": "Invalid address"}, "id": 1});
        let err = HttpTransport::interpret(
            StatusCode::INTERNAL_SERVER_ERROR,
            body.to_string().as_bytes(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RpcError::Application {
                code: -5,
                message: "Invalid address".into()
            }
        );
    }

    #[test]
    fn test_interpret_garbage() {
        let err = HttpTransport::interpret(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[test]
    fn test_interpret_result() {
        let body = json!({"result": {"blocks": 7}, "error": null, "id": 1});
        let value = HttpTransport::interpret(StatusCode::OK, body.to_string().as_bytes()).unwrap();
        assert_eq!(value["blocks"], 7);
    }
}
