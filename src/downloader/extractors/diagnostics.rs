// Failure diagnostics - identifies why a yt-dlp run failed
//
// Analyzes tool output to determine:
// - Why YouTube refused the request (403, bot check, rate limit, ...)
// - Whether the message is known harmless chatter
// - What the user can do about it

use serde::{Deserialize, Serialize};

/// Messages yt-dlp prints while it silently switches player clients.
/// They do not mean the download failed.
pub const BENIGN_WARNINGS: &[&str] = &[
    "ANDROID_VR client returned: This video is not available",
    "Switching to client: TV",
];

/// Reasons a download or info request can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// URL not recognised by the extractor
    InvalidUrl,

    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// SSL handshake failed or the connection was cut mid-handshake
    TlsHandshake,

    /// Network timeout (soft IP block)
    NetworkTimeout,

    /// Connection refused, reset or DNS failure
    ConnectionFailed,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// Private video requiring authorization
    PrivateVideo,

    /// Video deleted or unavailable
    VideoUnavailable,

    /// The requested format selector matched nothing
    FormatUnavailable,

    /// yt-dlp binary or Python module missing
    MissingTool,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Check if cookies might help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden | Self::AgeRestricted | Self::BotDetection | Self::PrivateVideo
        )
    }

    /// Check if proxy might help
    pub fn proxy_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::GeoBlocked
                | Self::NetworkTimeout
                | Self::ConnectionFailed
                | Self::RateLimited
                | Self::BotDetection
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "Unsupported or malformed URL",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::TlsHandshake => "SSL/TLS handshake failed",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::ConnectionFailed => "Connection failed",
            Self::RateLimited => "Rate limited by YouTube",
            Self::BotDetection => "Bot detection triggered",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::FormatUnavailable => "Requested format is not available",
            Self::MissingTool => "yt-dlp is not installed",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Lowercase fragments that only appear in SSL/TLS failures. Bare "ssl" or
/// "tls" would also hit video ids and titles.
const TLS_MARKERS: &[&str] = &[
    "eof occurred in violation of protocol",
    "[ssl",
    "_ssl.c",
    "sslerror",
    "ssl error",
    "ssl/tls",
    "tlsv1",
    "tls handshake",
    "handshake failure",
    "handshake operation timed out",
    "certificate verify failed",
    "wrong version number",
];

/// Whether tool output is one of the known harmless warnings
pub fn is_benign_warning(message: &str) -> bool {
    BENIGN_WARNINGS.iter().any(|w| message.contains(w))
}

/// Analyze error message and return failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    let lower = error.to_lowercase();

    if lower.trim().is_empty() {
        return None;
    }

    if lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("invalid url")
        || lower.contains("regexmatcherror")
    {
        return Some(FailureReason::InvalidUrl);
    }

    if lower.contains("command not found")
        || lower.contains("no module named yt_dlp")
    {
        return Some(FailureReason::MissingTool);
    }

    if lower.contains("requested format is not available") {
        return Some(FailureReason::FormatUnavailable);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(FailureReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("this video is no longer available")
        || lower.contains("video is unavailable")
        || lower.contains("videounavailable")
    {
        return Some(FailureReason::VideoUnavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(FailureReason::GeoBlocked);
    }

    // Must run before the generic connection checks: SSL errors arrive as
    // "<urlopen error [SSL: ...]>"
    if TLS_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Some(FailureReason::TlsHandshake);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("automated queries")
    {
        return Some(FailureReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Http403Forbidden);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(FailureReason::NetworkTimeout);
    }

    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("connection aborted")
        || lower.contains("network is unreachable")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("name or service not known")
        || lower.contains("failed to establish a new connection")
        || lower.contains("urlopen error")
    {
        return Some(FailureReason::ConnectionFailed);
    }

    Some(FailureReason::Unknown)
}

/// What to tell the user once a failure is final
pub fn suggestion(reason: FailureReason, using_proxy: bool) -> String {
    let mut tips = Vec::new();

    if reason.proxy_might_help() {
        if using_proxy {
            tips.push("check that the proxy can reach YouTube (--test-proxy)");
        } else {
            tips.push("try a proxy (-p HOST:PORT or --clash-verge)");
        }
    }
    if reason.cookies_might_help() {
        tips.push("pass browser cookies (--cookies-from-browser chrome)");
    }
    if matches!(reason, FailureReason::RateLimited | FailureReason::NetworkTimeout) {
        tips.push("wait a few minutes before retrying");
    }
    if reason == FailureReason::MissingTool {
        tips.push("install yt-dlp with --install");
    }

    if tips.is_empty() {
        reason.description().to_string()
    } else {
        format!("{}: {}", reason.description(), tips.join("; "))
    }
}
