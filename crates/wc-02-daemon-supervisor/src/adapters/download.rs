//! HTTP parameter downloader.

use crate::error::{SupervisorError, SupervisorResult};
use crate::ports::{ByteProgress, DownloadError, ParamsDownloader, ProgressSender};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use wc_01_rpc_session::TOR_SOCKS_PROXY;

/// Streams parameter files over HTTP(S).
pub struct HttpParamsDownloader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpParamsDownloader {
    pub fn new(base_url: impl Into<String>, use_tor: bool) -> SupervisorResult<Self> {
        // Files are hundreds of megabytes: bound the connect, not the transfer.
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(15));
        if use_tor {
            let proxy = reqwest::Proxy::all(TOR_SOCKS_PROXY)
                .map_err(|e| SupervisorError::Config(format!("invalid Tor proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SupervisorError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ParamsDownloader for HttpParamsDownloader {
    async fn fetch(
        &self,
        file: &str,
        dest: &Path,
        progress: ProgressSender,
    ) -> Result<(), DownloadError> {
        let url = format!("{}{}", self.base_url, file);
        debug!(url = %url, dest = %dest.display(), "Downloading parameter file");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloadError::Http(format!(
                "{url}: HTTP {}",
                response.status().as_u16()
            )));
        }

        let total = response.content_length();
        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;

        let mut done = 0u64;
        let _ = progress.send(ByteProgress { done, total });

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Io(e.to_string()))?;
            done += chunk.len() as u64;
            let _ = progress.send(ByteProgress { done, total });
        }

        out.flush()
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        out.sync_all()
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;

        match total {
            Some(expected) if expected != done => Err(DownloadError::Http(format!(
                "{url}: truncated at {done} of {expected} bytes"
            ))),
            _ => Ok(()),
        }
    }
}
