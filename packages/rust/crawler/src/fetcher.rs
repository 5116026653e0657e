//! Direct HTTP download of documents found in embedded viewers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mfdocs_shared::{HttpConfig, MfDocsError, Result};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Fetch `url` into `dir/filename`.
///
/// Returns `true` when the file is on disk afterwards (including when it was
/// already there), `false` on any failure. Failures are logged, never raised.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, filename: &str, dir: &Path) -> bool;
}

/// Streaming `reqwest` downloader with a browser-like identity.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MfDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Stream the body into `<target>.part`, then rename onto `target`.
    async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MfDocsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MfDocsError::Network(format!("{url}: HTTP {status}")));
        }

        let mut part_name = target.file_name().unwrap_or_default().to_os_string();
        part_name.push(".part");
        let part = target.with_file_name(part_name);

        let written = async {
            let mut file = tokio::fs::File::create(&part)
                .await
                .map_err(|e| MfDocsError::io(&part, e))?;
            let mut stream = response.bytes_stream();
            let mut written: u64 = 0;

            while let Some(chunk) = stream.next().await {
                let chunk =
                    chunk.map_err(|e| MfDocsError::Network(format!("{url}: body read failed: {e}")))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| MfDocsError::io(&part, e))?;
                written += chunk.len() as u64;
            }

            file.flush().await.map_err(|e| MfDocsError::io(&part, e))?;
            Ok::<u64, MfDocsError>(written)
        }
        .await;

        match written {
            Ok(bytes) => {
                tokio::fs::rename(&part, target)
                    .await
                    .map_err(|e| MfDocsError::io(target, e))?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpDownloader {
    async fn fetch(&self, url: &str, filename: &str, dir: &Path) -> bool {
        let target = dir.join(filename);
        if target.exists() {
            info!(filename, "file already exists - skipping download");
            return true;
        }

        debug!(url, filename, "downloading document");
        match self.download(url, &target).await {
            Ok(bytes) => {
                info!(filename, bytes, "downloaded");
                true
            }
            Err(e) => {
                warn!(url, error = %e, "failed to download");
                false
            }
        }
    }
}
