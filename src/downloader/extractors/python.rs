// Python InfoExtractor - uses `python3 -m yt_dlp`
//
// Advantages:
// - Works where only the pip package is installed
// - Works well with cookies/auth
//
// Disadvantages:
// - Requires Python 3 and yt-dlp module
// - Slightly slower than native binary

use async_trait::async_trait;
use std::process::Command as StdCommand;
use tracing::debug;

use super::traits::{info_args, parse_info_json, ExtractorConfig, InfoExtractor};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::VideoInfo;
use crate::downloader::utils::{run_output_with_timeout, validate_url};

const PROBE_TIMEOUT_SECS: u64 = 10;

/// Environment variable naming the interpreter to use
pub const PYTHON_ENV: &str = "YTDLP_PYTHON";

/// Python-based info extractor using yt_dlp module
pub struct PythonInfoExtractor {
    python_cmd: String,
}

impl PythonInfoExtractor {
    pub fn new() -> Self {
        Self {
            python_cmd: python_command(),
        }
    }

    pub fn with_interpreter(cmd: impl Into<String>) -> Self {
        Self {
            python_cmd: cmd.into(),
        }
    }

    /// Check if yt_dlp module is installed (blocking)
    fn has_ytdlp_module(&self) -> bool {
        StdCommand::new(&self.python_cmd)
            .args(["-c", "import yt_dlp"])
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Same check as `has_ytdlp_module`, without blocking the runtime
    async fn probe_module(&self) -> bool {
        run_output_with_timeout(&self.python_cmd, &["-c", "import yt_dlp"], PROBE_TIMEOUT_SECS)
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

/// Interpreter from `YTDLP_PYTHON`, else `python3` (`python` on Windows)
pub fn python_command() -> String {
    match std::env::var(PYTHON_ENV) {
        Ok(custom) if !custom.trim().is_empty() => custom,
        _ if cfg!(windows) => "python".to_string(),
        _ => "python3".to_string(),
    }
}

impl Default for PythonInfoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InfoExtractor for PythonInfoExtractor {
    fn name(&self) -> &'static str {
        "python-yt-dlp"
    }

    fn is_available(&self) -> bool {
        self.has_ytdlp_module()
    }

    async fn extract(&self, url: &str, config: &ExtractorConfig) -> Result<VideoInfo, DownloadError> {
        validate_url(url)?;

        if !self.probe_module().await {
            return Err(DownloadError::ToolNotFound(
                "Python yt_dlp module not installed".to_string(),
            ));
        }

        let mut args = vec!["-m".to_string(), "yt_dlp".to_string()];
        args.extend(info_args(url, config, None));
        debug!("[PythonExtractor] Running: {} {}", self.python_cmd, args.join(" "));

        let output =
            run_output_with_timeout(&self.python_cmd, &args, config.timeout_seconds as u64).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::from(stderr.to_string()));
        }

        parse_info_json(&output.stdout)
    }
}
