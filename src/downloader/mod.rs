// Downloader module - backends, metadata extraction and post-processing

pub mod backends;
pub mod errors;
pub mod extractors;
pub mod fetch;
pub mod format_selector;
pub mod models;
pub mod muxer;
pub mod orchestrator;
pub mod progress;
pub mod proxy;
pub mod retry;
pub mod session;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{DownloadError, ErrorClass};
pub use models::{DownloadOutcome, DownloadRequest, Engine, NetworkConfig, Quality, StreamFormat, VideoInfo};
pub use orchestrator::Downloader;
pub use progress::{ChannelSink, Phase, ProgressEvent, ProgressUpdate, TerminalSink};
pub use proxy::{ProxyConfig, ProxyKind};
pub use retry::RetryPolicy;
pub use session::{DownloadRecord, DownloadStatus, Session};
pub use traits::{DownloaderBackend, ProgressSink};
