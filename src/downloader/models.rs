// Common data models for downloader

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::proxy::ProxyConfig;

/// Requested output quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quality {
    /// Highest resolution available
    Best,
    /// Exact height such as 720 or 1080
    Height(u32),
    /// Audio track only (converted to mp3 when ffmpeg is present)
    AudioOnly,
}

impl Quality {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::Height(720)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::Height(h) => write!(f, "{}p", h),
            Self::AudioOnly => write!(f, "audio"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    /// Accepts `720`, `720p`, `best`, `audio`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "best" | "highest" => return Ok(Self::Best),
            "audio" | "audio-only" | "audio_only" | "mp3" => return Ok(Self::AudioOnly),
            _ => {}
        }

        let digits = normalized.strip_suffix('p').unwrap_or(&normalized);
        match digits.parse::<u32>() {
            Ok(h) if h > 0 => Ok(Self::Height(h)),
            _ => Err(format!(
                "invalid resolution '{}', expected e.g. 720p, 1080, best or audio",
                s
            )),
        }
    }
}

impl TryFrom<String> for Quality {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

/// Which backend performs the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    /// yt-dlp first, then the direct fetcher
    #[default]
    Auto,
    /// yt-dlp drives download and merge
    YtDlp,
    /// Stream chosen here, fetched with reqwest, muxed with ffmpeg
    Direct,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::YtDlp => write!(f, "yt-dlp"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "yt-dlp" | "ytdlp" | "yt_dlp" => Ok(Self::YtDlp),
            "direct" => Ok(Self::Direct),
            other => Err(format!(
                "unknown engine '{}', expected auto, yt-dlp or direct",
                other
            )),
        }
    }
}

/// Video information extracted from YouTube
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: Option<u64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub formats: Vec<StreamFormat>,
}

impl VideoInfo {
    /// Duration as `M:SS` or `H:MM:SS`
    pub fn duration_label(&self) -> String {
        match self.duration_seconds {
            Some(total) => {
                let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
                if h > 0 {
                    format!("{}:{:02}:{:02}", h, m, s)
                } else {
                    format!("{}:{:02}", m, s)
                }
            }
            None => "unknown".to_string(),
        }
    }
}

/// One downloadable stream as reported by yt-dlp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub format_id: String,
    pub ext: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    /// Total bitrate in kbps
    pub tbr: Option<f32>,
    /// Audio bitrate in kbps
    pub abr: Option<f32>,
    pub format_note: Option<String>,
    /// Direct media URL, present for plain HTTP(S) formats
    pub url: Option<String>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if c != "none")
}

impl StreamFormat {
    pub fn has_video(&self) -> bool {
        codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.acodec)
    }

    /// Audio and video in one file
    pub fn is_progressive(&self) -> bool {
        self.has_video() && self.has_audio()
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    pub fn is_h264(&self) -> bool {
        self.vcodec
            .as_deref()
            .map(|c| c.starts_with("avc1") || c.starts_with("h264"))
            .unwrap_or(false)
    }

    pub fn is_aac(&self) -> bool {
        self.acodec
            .as_deref()
            .map(|c| c.starts_with("mp4a") || c.starts_with("aac"))
            .unwrap_or(false)
    }

    /// Can be fetched with a single HTTP GET
    pub fn is_direct(&self) -> bool {
        self.url.is_some()
            && matches!(self.protocol.as_deref(), Some("https") | Some("http") | None)
    }

    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// `1920x1080`, `720p` or `audio only`
    pub fn resolution_label(&self) -> String {
        if !self.has_video() {
            return "audio only".to_string();
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            (None, Some(h)) => format!("{}p", h),
            _ => "unknown".to_string(),
        }
    }
}

/// What to download and where
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: Quality,
    /// Explicit yt-dlp format id; overrides `quality`
    pub format_id: Option<String>,
    pub output_dir: PathBuf,
    pub network: NetworkConfig,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, quality: Quality, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            quality,
            format_id: None,
            output_dir: output_dir.into(),
            network: NetworkConfig::default(),
        }
    }
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub backend: &'static str,
    /// Video and audio were downloaded separately and merged
    pub merged: bool,
}

/// Network configuration for backends
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub proxy: Option<ProxyConfig>,

    /// Socket timeout in seconds
    pub timeout: u32,

    /// Skip certificate verification
    pub insecure_tls: bool,

    pub cookies_path: Option<String>,
    pub cookies_from_browser: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: 15,
            insecure_tls: false,
            cookies_path: None,
            cookies_from_browser: None,
        }
    }
}

impl NetworkConfig {
    /// Same settings with certificate checks turned off
    pub fn relaxed(&self) -> Self {
        Self {
            insecure_tls: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(vcodec: &str, acodec: &str) -> StreamFormat {
        StreamFormat {
            format_id: "1".to_string(),
            ext: "mp4".to_string(),
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_quality_parsing() {
        assert_eq!("720p".parse::<Quality>(), Ok(Quality::Height(720)));
        assert_eq!("1080".parse::<Quality>(), Ok(Quality::Height(1080)));
        assert_eq!("BEST".parse::<Quality>(), Ok(Quality::Best));
        assert_eq!("audio".parse::<Quality>(), Ok(Quality::AudioOnly));
        assert!("0p".parse::<Quality>().is_err());
        assert!("hd".parse::<Quality>().is_err());
    }

    #[test]
    fn test_quality_display_roundtrips_through_serde() {
        let json = serde_json::to_string(&Quality::Height(480)).unwrap();
        assert_eq!(json, "\"480p\"");
        let back: Quality = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Quality::Height(480));
    }

    #[test]
    fn test_engine_parsing() {
        assert_eq!("yt-dlp".parse::<Engine>(), Ok(Engine::YtDlp));
        assert_eq!("Direct".parse::<Engine>(), Ok(Engine::Direct));
        assert!("pytube".parse::<Engine>().is_err());
    }

    #[test]
    fn test_stream_kinds() {
        assert!(format("avc1.64001F", "mp4a.40.2").is_progressive());
        assert!(format("vp9", "none").is_video_only());
        assert!(format("none", "opus").is_audio_only());
        assert_eq!(format("none", "opus").resolution_label(), "audio only");
    }

    #[test]
    fn test_duration_label() {
        let mut info = VideoInfo {
            id: "x".into(),
            title: "t".into(),
            uploader: "u".into(),
            duration_seconds: Some(3725),
            thumbnail: None,
            webpage_url: None,
            formats: vec![],
        };
        assert_eq!(info.duration_label(), "1:02:05");
        info.duration_seconds = Some(65);
        assert_eq!(info.duration_label(), "1:05");
    }
}
