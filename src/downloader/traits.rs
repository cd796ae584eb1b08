// Downloader backend trait definition

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{DownloadOutcome, DownloadRequest};
use super::progress::ProgressEvent;

/// Trait for downloader backend implementations
#[async_trait]
pub trait DownloaderBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Download one video, reporting progress to `sink`.
    /// A single attempt; retrying is the orchestrator's job.
    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError>;
}

/// Receives progress events from a running download
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}
