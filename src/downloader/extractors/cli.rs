// CLI InfoExtractor - uses native `yt-dlp` binary
//
// Advantages:
// - Faster than Python mode
// - No Python dependency
//
// Disadvantages:
// - More likely to trigger YouTube bot detection
// - May require different player clients

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Command as StdCommand;
use tracing::{debug, info, warn};

use super::traits::{info_args, parse_info_json, ExtractorConfig, InfoExtractor};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::VideoInfo;
use crate::downloader::utils::{find_executable, is_youtube_url, run_output_with_timeout, validate_url};

const PROBE_TIMEOUT_SECS: u64 = 10;

/// CLI-based info extractor using yt-dlp binary
pub struct CliInfoExtractor {
    ytdlp_path: PathBuf,
}

impl CliInfoExtractor {
    pub fn new() -> Self {
        Self {
            ytdlp_path: find_executable("yt-dlp").unwrap_or_else(|| PathBuf::from("yt-dlp")),
        }
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: path.into(),
        }
    }

    /// Check if yt-dlp binary is available (blocking)
    fn has_ytdlp_binary(&self) -> bool {
        StdCommand::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Same check as `has_ytdlp_binary`, without blocking the runtime
    async fn probe_binary(&self) -> bool {
        run_output_with_timeout(&self.ytdlp_path, &["--version"], PROBE_TIMEOUT_SECS)
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Try extraction with each player client in turn.
    ///
    /// Only a YouTube refusal (403, bot check) moves on to the next client;
    /// anything else is returned immediately.
    async fn try_with_clients(
        &self,
        url: &str,
        config: &ExtractorConfig,
        clients: &[Option<&str>],
    ) -> Result<VideoInfo, DownloadError> {
        let mut last_error = DownloadError::Unknown("No clients to try".to_string());

        for client in clients {
            let args = info_args(url, config, *client);
            let label = client.unwrap_or("default");
            debug!(
                "[CliExtractor] Trying client '{}': {} {}",
                label,
                self.ytdlp_path.display(),
                args.join(" ")
            );

            let output =
                run_output_with_timeout(&self.ytdlp_path, &args, config.timeout_seconds as u64)
                    .await?;

            if output.status.success() {
                info!("[CliExtractor] Success with client '{}'", label);
                return parse_info_json(&output.stdout);
            }

            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!("[CliExtractor] Client '{}' failed: {}", label, stderr.trim());
            last_error = DownloadError::from(stderr);
            if !matches!(last_error, DownloadError::BlockedByYouTube(_)) {
                break;
            }
        }

        Err(last_error)
    }
}

impl Default for CliInfoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InfoExtractor for CliInfoExtractor {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    fn is_available(&self) -> bool {
        self.has_ytdlp_binary()
    }

    async fn extract(&self, url: &str, config: &ExtractorConfig) -> Result<VideoInfo, DownloadError> {
        validate_url(url)?;

        if !self.probe_binary().await {
            return Err(DownloadError::ToolNotFound(
                "yt-dlp binary not found".to_string(),
            ));
        }

        // Configured client first; for YouTube fall back to clients that
        // are refused less often
        let clients: Vec<Option<&str>> = if config.player_client.is_none() && is_youtube_url(url) {
            vec![None, Some("tv"), Some("web_safari")]
        } else {
            vec![None]
        };

        self.try_with_clients(url, config, &clients).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::downloader::test_support::{write_script, SAMPLE_JSON};

    fn stub(dir: &std::path::Path, body: &str) -> CliInfoExtractor {
        CliInfoExtractor::with_binary(write_script(dir, "yt-dlp", body))
    }

    #[tokio::test]
    async fn test_extract_parses_stub_output() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = stub(
            dir.path(),
            &format!(
                "if [ \"$1\" = \"--version\" ]; then echo 2024.01.01; exit 0; fi\ncat <<'JSON'\n{}\nJSON",
                SAMPLE_JSON
            ),
        );

        assert!(extractor.is_available());
        let info = extractor
            .extract("https://www.youtube.com/watch?v=dQw4w9WgXcQ", &ExtractorConfig::default())
            .await
            .unwrap();
        assert_eq!(info.title, "Sample Video");
        assert_eq!(info.formats.len(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_video_is_not_retried_with_other_clients() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let extractor = stub(
            dir.path(),
            &format!(
                "if [ \"$1\" = \"--version\" ]; then exit 0; fi\necho x >> {}\necho 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1",
                counter.display()
            ),
        );

        let err = extractor
            .extract("https://www.youtube.com/watch?v=abc", &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Unavailable(_)));
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_blocked_request_tries_next_client() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let extractor = stub(
            dir.path(),
            &format!(
                "if [ \"$1\" = \"--version\" ]; then exit 0; fi\necho x >> {}\necho 'ERROR: HTTP Error 403: Forbidden' >&2\nexit 1",
                counter.display()
            ),
        );

        let err = extractor
            .extract("https://www.youtube.com/watch?v=abc", &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::BlockedByYouTube(_)));
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let extractor = CliInfoExtractor::with_binary("/nonexistent/yt-dlp");
        assert!(!extractor.is_available());
        let err = extractor
            .extract("https://www.youtube.com/watch?v=abc", &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));

        let dir = tempfile::tempdir().unwrap();
        let broken = stub(dir.path(), "exit 2");
        let err = broken
            .extract("https://www.youtube.com/watch?v=abc", &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_spawning() {
        let extractor = CliInfoExtractor::with_binary("/nonexistent/yt-dlp");
        let err = extractor
            .extract("notaurl", &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }
}
