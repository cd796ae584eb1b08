// InfoExtractor trait and common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{NetworkConfig, StreamFormat, VideoInfo};
use crate::downloader::utils::{is_youtube_url, network_args};

/// Extraction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// Python module yt_dlp (better for YouTube, avoids bot detection)
    Python,
    /// CLI binary yt-dlp (faster, no Python dependency)
    Cli,
    /// Auto-select: CLI first, Python module as fallback
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "cli" => Ok(Self::Cli),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown extractor '{}', expected auto, python or cli",
                other
            )),
        }
    }
}

/// Configuration for info extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Extraction mode (Python, CLI, or Auto)
    pub mode: ExtractorMode,
    /// Proxy, socket timeout, TLS and cookies
    pub network: NetworkConfig,
    /// Deadline for the whole yt-dlp run in seconds
    pub timeout_seconds: u32,
    /// YouTube player client (android, web, tv)
    pub player_client: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            network: NetworkConfig::default(),
            timeout_seconds: 30,
            player_client: None,
        }
    }
}

impl ExtractorConfig {
    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_player_client(mut self, client: Option<String>) -> Self {
        self.player_client = client;
        self
    }
}

/// Trait for info extractors
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Check if this extractor is available
    fn is_available(&self) -> bool;

    /// Extract video info with formats
    async fn extract(&self, url: &str, config: &ExtractorConfig)
        -> Result<VideoInfo, DownloadError>;
}

/// yt-dlp arguments for a metadata dump, shared by both extractors
pub(crate) fn info_args(url: &str, config: &ExtractorConfig, client: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--retries".to_string(),
        "2".to_string(),
    ];
    args.extend(network_args(&config.network));

    // Player client for YouTube
    if let Some(client) = client.or(config.player_client.as_deref()) {
        if is_youtube_url(url) {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", client));
        }
    }

    args.push(url.to_string());
    args
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    formats: Option<Vec<RawFormat>>,
    // Single-format results carry the format fields at top level
    #[serde(flatten)]
    single: RawFormat,
}

#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    fps: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    tbr: Option<f64>,
    abr: Option<f64>,
    format_note: Option<String>,
    url: Option<String>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

impl RawFormat {
    fn into_stream(self) -> Option<StreamFormat> {
        // Storyboard images are listed as formats too
        if self.ext.as_deref() == Some("mhtml") {
            return None;
        }
        Some(StreamFormat {
            format_id: self.format_id?,
            ext: self.ext.unwrap_or_default(),
            width: self.width.map(|w| w as u32),
            height: self.height.map(|h| h as u32),
            fps: self.fps.map(|f| f as f32),
            vcodec: self.vcodec,
            acodec: self.acodec,
            filesize: self.filesize.map(|s| s as u64),
            filesize_approx: self.filesize_approx.map(|s| s as u64),
            tbr: self.tbr.map(|t| t as f32),
            abr: self.abr.map(|a| a as f32),
            format_note: self.format_note,
            url: self.url,
            protocol: self.protocol,
            http_headers: self.http_headers,
        })
    }
}

/// Parse `--dump-json` output into VideoInfo
pub(crate) fn parse_info_json(stdout: &[u8]) -> Result<VideoInfo, DownloadError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| DownloadError::Parse("yt-dlp printed no JSON".to_string()))?;

    let raw: RawInfo = serde_json::from_str(line)
        .map_err(|e| DownloadError::Parse(format!("Invalid JSON: {}", e)))?;

    let formats: Vec<StreamFormat> = match raw.formats {
        Some(list) => list.into_iter().filter_map(RawFormat::into_stream).collect(),
        None => raw.single.into_stream().into_iter().collect(),
    };

    if formats.is_empty() {
        return Err(DownloadError::Parse("No formats in JSON".to_string()));
    }

    Ok(VideoInfo {
        id: raw.id.unwrap_or_else(|| "unknown".to_string()),
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        uploader: raw.uploader.unwrap_or_else(|| "Unknown".to_string()),
        duration_seconds: raw.duration.map(|d| d as u64),
        thumbnail: raw.thumbnail,
        webpage_url: raw.webpage_url,
        formats,
    })
}
