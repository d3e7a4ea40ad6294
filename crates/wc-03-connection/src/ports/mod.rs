//! Outbound ports of the connection machine.

use wc_01_rpc_session::{RpcCredentials, RpcEndpoint, RpcResult, RpcSession};

/// Builds an [`RpcSession`] for a resolved endpoint.
///
/// A new session is created whenever credentials or endpoint change; a
/// session is never mutated in place.
pub trait SessionFactory: Send + Sync {
    fn create(
        &self,
        endpoint: &RpcEndpoint,
        credentials: &RpcCredentials,
        use_tor: bool,
    ) -> RpcResult<RpcSession>;
}
