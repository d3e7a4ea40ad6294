//! Adapters implementing the RPC transport port.

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
