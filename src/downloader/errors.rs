// Error types for downloader backends

use thiserror::Error;

use super::extractors::{diagnose_error, is_benign_warning, FailureReason};

/// How the retry loop treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying cannot help (bad URL, video gone, missing tool, broken file)
    Fatal,
    /// Network, TLS or timeout trouble; retried with growing delay
    Transient,
    /// Known harmless tool chatter; logged, then the attempt is repeated
    Benign,
}

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// URL is malformed or not handled by the extractor
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Video is private, removed, region-locked or otherwise gone
    #[error("Video unavailable: {0}")]
    Unavailable(String),

    /// Connection refused/reset, DNS failure and friends
    #[error("Network error: {0}")]
    Network(String),

    /// TLS handshake or certificate failure
    #[error("SSL/TLS error: {0}")]
    Tls(String),

    /// Network timeout while talking to YouTube
    #[error("Network timeout: {0}")]
    Timeout(String),

    /// YouTube throttled or rejected the request (403, 429, bot check)
    #[error("YouTube is throttling requests from this IP address: {0}")]
    BlockedByYouTube(String),

    /// yt-dlp, python or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Command execution failed for an unclassified reason
    #[error("Execution error: {0}")]
    Execution(String),

    /// ffmpeg could not merge or convert the downloaded streams
    #[error("Muxing failed: {0}")]
    Mux(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(String),

    /// A known harmless extractor message surfaced as a failure
    #[error("Extractor warning: {0}")]
    BenignWarning(String),

    /// Unknown error with details
    #[error("Unknown error: {0}")]
    Unknown(String),
}

const TLS_HINT: &str = "This looks like an SSL handshake problem. What to try:\n\
     1) Make sure the proxy is running and can reach YouTube\n\
     2) Use a SOCKS5 proxy instead of an HTTP proxy (-t socks5)\n\
     3) Check that the system clock is correct\n\
     4) Restart the VPN software\n\
     5) Update yt-dlp and the system OpenSSL libraries";

impl DownloadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidUrl(_)
            | Self::Unavailable(_)
            | Self::ToolNotFound(_)
            | Self::Parse(_)
            | Self::Mux(_)
            | Self::Io(_) => ErrorClass::Fatal,
            Self::BenignWarning(_) => ErrorClass::Benign,
            Self::Network(_)
            | Self::Tls(_)
            | Self::Timeout(_)
            | Self::BlockedByYouTube(_)
            | Self::Execution(_)
            | Self::Unknown(_) => ErrorClass::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() != ErrorClass::Fatal
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Whether trying a different backend is pointless after this error
    pub fn stops_fallback(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::Unavailable(_))
    }

    /// Short name used in "failed after N attempts (kind)" reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid-url",
            Self::Unavailable(_) => "unavailable",
            Self::Network(_) => "network",
            Self::Tls(_) => "tls",
            Self::Timeout(_) => "timeout",
            Self::BlockedByYouTube(_) => "blocked",
            Self::ToolNotFound(_) => "tool-not-found",
            Self::Parse(_) => "parse",
            Self::Execution(_) => "execution",
            Self::Mux(_) => "mux",
            Self::Io(_) => "io",
            Self::BenignWarning(_) => "warning",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Advice printed once every retry is exhausted
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Tls(_) => TLS_HINT,
            Self::InvalidUrl(_) => "Check that the link points to a single YouTube video.",
            Self::Unavailable(_) => {
                "The video is private, removed or not available in your region."
            }
            Self::ToolNotFound(_) => {
                "Install the missing tool with --install (yt-dlp) or --install-ffmpeg."
            }
            Self::BlockedByYouTube(_) => {
                "YouTube is limiting this IP. Wait a while, or use a proxy (-p HOST:PORT)."
            }
            _ => "Try using a proxy or try again later.",
        }
    }
}

/// Lines of tool output that carry the actual failure.
///
/// yt-dlp mixes `WARNING:` chatter with the final `ERROR:` line; when an
/// error line exists only that part is classified.
fn error_focus(s: &str) -> String {
    let errors: Vec<&str> = s
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if errors.is_empty() {
        s.to_string()
    } else {
        errors.join("\n")
    }
}

// Raw stderr from yt-dlp / python is classified by content
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let focus = error_focus(&s);

        if is_benign_warning(&focus) {
            return Self::BenignWarning(s);
        }

        match diagnose_error(&focus) {
            Some(FailureReason::InvalidUrl) => Self::InvalidUrl(s),
            Some(
                FailureReason::VideoUnavailable
                | FailureReason::PrivateVideo
                | FailureReason::GeoBlocked
                | FailureReason::AgeRestricted,
            ) => Self::Unavailable(s),
            Some(FailureReason::TlsHandshake) => Self::Tls(s),
            Some(FailureReason::NetworkTimeout) => {
                // Timeouts against youtube.com itself are usually a soft IP block
                if focus.contains("youtube.com") {
                    Self::BlockedByYouTube(s)
                } else {
                    Self::Timeout(s)
                }
            }
            Some(
                FailureReason::Http403Forbidden
                | FailureReason::RateLimited
                | FailureReason::BotDetection,
            ) => Self::BlockedByYouTube(s),
            Some(FailureReason::ConnectionFailed) => Self::Network(s),
            Some(FailureReason::MissingTool) => Self::ToolNotFound(s),
            Some(FailureReason::FormatUnavailable | FailureReason::Unknown) | None => {
                if focus.contains("JSON") {
                    Self::Parse(s)
                } else {
                    Self::Unknown(s)
                }
            }
        }
    }
}

impl From<&str> for DownloadError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut => Self::Timeout(e.to_string()),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => Self::Network(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        let msg = e.to_string();
        // The request URL may contain anything, keep it out of the match
        let e = e.without_url();
        let detail = format!("{e:?}").to_lowercase();

        if e.is_timeout() {
            return Self::Timeout(msg);
        }
        if let Some(status) = e.status() {
            return match status.as_u16() {
                403 | 429 => Self::BlockedByYouTube(msg),
                404 | 410 => Self::Unavailable(msg),
                _ => Self::Network(msg),
            };
        }
        if detail.contains("certificate")
            || detail.contains("handshake")
            || detail.contains("tls")
            || detail.contains("ssl")
        {
            return Self::Tls(msg);
        }
        if e.is_builder() {
            return Self::InvalidUrl(msg);
        }
        Self::Network(msg)
    }
}
