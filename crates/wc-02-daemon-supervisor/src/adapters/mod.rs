//! Production adapters for the supervisor ports.

pub mod download;
pub mod process;

pub use download::HttpParamsDownloader;
pub use process::TokioProcessLauncher;
