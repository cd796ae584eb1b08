// InfoExtractor Orchestrator - mode selection and fallback
//
// Strategy:
// 1. Python / Cli modes use exactly that extractor
// 2. Auto tries the native binary first (faster), then the Python module
// 3. Fallback is skipped when the first failure is final (bad URL, removed video)

use tracing::{info, warn};

use super::cli::CliInfoExtractor;
use super::python::PythonInfoExtractor;
use super::traits::{ExtractorConfig, ExtractorMode, InfoExtractor};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::VideoInfo;

/// Orchestrator that manages Python and CLI extractors
pub struct InfoExtractorOrchestrator {
    python: Box<dyn InfoExtractor>,
    cli: Box<dyn InfoExtractor>,
}

impl InfoExtractorOrchestrator {
    pub fn new() -> Self {
        Self {
            python: Box::new(PythonInfoExtractor::new()),
            cli: Box::new(CliInfoExtractor::new()),
        }
    }

    pub fn with_extractors(python: Box<dyn InfoExtractor>, cli: Box<dyn InfoExtractor>) -> Self {
        Self { python, cli }
    }

    /// Mode Auto would start with right now
    pub fn recommend_mode(&self) -> ExtractorMode {
        if self.cli.is_available() {
            ExtractorMode::Cli
        } else {
            ExtractorMode::Python
        }
    }

    /// Get availability status
    pub fn get_status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            python_available: self.python.is_available(),
            cli_available: self.cli.is_available(),
            recommended_mode: self.recommend_mode(),
        }
    }

    /// Extract video info following `config.mode`
    pub async fn extract(
        &self,
        url: &str,
        config: &ExtractorConfig,
    ) -> Result<VideoInfo, DownloadError> {
        match config.mode {
            ExtractorMode::Python => self.python.extract(url, config).await,
            ExtractorMode::Cli => self.cli.extract(url, config).await,
            ExtractorMode::Auto => self.extract_auto(url, config).await,
        }
    }

    async fn extract_auto(
        &self,
        url: &str,
        config: &ExtractorConfig,
    ) -> Result<VideoInfo, DownloadError> {
        let primary = &self.cli;
        let fallback = &self.python;

        info!("[Orchestrator] Trying primary mode: {}", primary.name());
        let first_error = match primary.extract(url, config).await {
            Ok(info) => {
                info!("[Orchestrator] Primary mode {} succeeded", primary.name());
                return Ok(info);
            }
            Err(e) => e,
        };
        warn!("[Orchestrator] Primary mode {} failed: {}", primary.name(), first_error);

        if first_error.stops_fallback() {
            return Err(first_error);
        }

        info!("[Orchestrator] Trying fallback mode: {}", fallback.name());
        match fallback.extract(url, config).await {
            Ok(info) => {
                info!("[Orchestrator] Fallback mode {} succeeded", fallback.name());
                Ok(info)
            }
            // A missing Python module says nothing about the video; keep the real error
            Err(DownloadError::ToolNotFound(_))
                if !matches!(first_error, DownloadError::ToolNotFound(_)) =>
            {
                Err(first_error)
            }
            Err(DownloadError::ToolNotFound(_)) => Err(DownloadError::ToolNotFound(
                "Neither Python yt_dlp nor yt-dlp binary available".to_string(),
            )),
            Err(e) => {
                warn!("[Orchestrator] Fallback mode {} failed: {}", fallback.name(), e);
                Err(e)
            }
        }
    }
}

impl Default for InfoExtractorOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Status of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub python_available: bool,
    pub cli_available: bool,
    pub recommended_mode: ExtractorMode,
}
