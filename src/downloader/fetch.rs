// Streaming HTTP fetch with per-chunk progress

use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::errors::DownloadError;
use super::models::NetworkConfig;
use super::utils::format_size;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// HTTP client for one download attempt
///
/// Built fresh per attempt so proxy and TLS settings always reflect the
/// current `NetworkConfig`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(network: &NetworkConfig) -> Result<Self, DownloadError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(network.timeout as u64));

        builder = match &network.proxy {
            Some(proxy) => builder.proxy(proxy.reqwest_proxy()?),
            None => builder.no_proxy(),
        };

        if network.insecure_tls {
            debug!("[Fetch] Certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest`, calling `on_chunk(downloaded, total)` after
    /// every chunk. Returns the number of bytes written.
    ///
    /// `expected_size` is used when the server sends no Content-Length.
    /// A partially written file is left in place on failure.
    pub async fn fetch_to_file<F>(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        dest: &Path,
        expected_size: Option<u64>,
        mut on_chunk: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req.send().await?.error_for_status()?;
        let total = response.content_length().or(expected_size);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_chunk(downloaded, total);
        }
        file.flush().await?;

        info!(
            "[Fetch] Saved {} ({})",
            dest.display(),
            format_size(downloaded)
        );
        Ok(downloaded)
    }
}
