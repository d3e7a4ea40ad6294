//! Adapters for the connection ports.

pub mod http;

pub use http::HttpSessionFactory;
