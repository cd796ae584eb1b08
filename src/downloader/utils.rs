// Helper functions for backend implementations

use crate::downloader::errors::DownloadError;
use crate::downloader::models::NetworkConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r#"[\\/*?:"<>|]"#).unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*([KMGT]?i?B)\s*$").unwrap();
}

/// Run command with timeout (shared utility)
///
/// The child is killed if the deadline passes. A binary that cannot be
/// spawned because it does not exist maps to `ToolNotFound`.
pub async fn run_output_with_timeout<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let program = program.as_ref();
    let child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| {
            DownloadError::Execution(format!(
                "Failed to wait for {}: {}",
                program.to_string_lossy(),
                e
            ))
        }),
        Err(_) => Err(DownloadError::Timeout(format!(
            "{} timed out after {}s",
            program.to_string_lossy(),
            timeout_secs
        ))),
    }
}

/// Map a spawn failure to the matching error variant
pub fn spawn_error(program: &OsStr, e: std::io::Error) -> DownloadError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DownloadError::ToolNotFound(format!("{} is not installed", program.to_string_lossy()))
    } else {
        DownloadError::Execution(format!(
            "Failed to start {}: {}",
            program.to_string_lossy(),
            e
        ))
    }
}

/// Locate an executable on PATH, then in the usual install prefixes
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let file_names: Vec<String> = if cfg!(windows) {
        vec![format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    dirs.extend(
        ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"]
            .iter()
            .map(PathBuf::from),
    );
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".local").join("bin"));
    }

    dirs.iter()
        .flat_map(|dir| file_names.iter().map(move |f| dir.join(f)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Strip characters that are illegal in file names on common filesystems
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name, "");
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Human readable byte count, e.g. `12.34 MB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Parse yt-dlp size strings such as `343.72MiB` or `10.5KB`
pub fn parse_size(text: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier: f64 = match &caps[2] {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

pub fn is_youtube_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// Cheap sanity check before spawning any tool
pub fn validate_url(url: &str) -> Result<(), DownloadError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::InvalidUrl("URL is empty".to_string()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(DownloadError::InvalidUrl(format!(
            "{} is not an http(s) URL",
            trimmed
        )));
    }
    if trimmed.contains(char::is_whitespace) {
        return Err(DownloadError::InvalidUrl(format!(
            "{} contains whitespace",
            trimmed
        )));
    }
    Ok(())
}

/// Build proxy, timeout, TLS and cookie arguments for yt-dlp
pub fn network_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = vec![
        "--socket-timeout".to_string(),
        config.timeout.to_string(),
    ];

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.url());
    }

    if config.insecure_tls {
        args.push("--no-check-certificates".to_string());
    }

    if let Some(path) = &config.cookies_path {
        args.push("--cookies".to_string());
        args.push(path.clone());
    } else if let Some(browser) = &config.cookies_from_browser {
        args.push("--cookies-from-browser".to_string());
        args.push(browser.clone());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::proxy::{ProxyConfig, ProxyKind};

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_filename("  My Video.  "), "My Video");
        assert_eq!(sanitize_filename("???"), "video");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1.00KiB"), Some(1024));
        assert_eq!(parse_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("10.5KB"), Some(10_500));
        assert_eq!(parse_size("Unknown"), None);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(matches!(
            validate_url("not a url"),
            Err(DownloadError::InvalidUrl(_))
        ));
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_network_args() {
        let config = NetworkConfig {
            proxy: Some(ProxyConfig::new(ProxyKind::Socks5, "127.0.0.1", 1080)),
            timeout: 15,
            insecure_tls: true,
            cookies_path: None,
            cookies_from_browser: Some("firefox".to_string()),
        };
        let args = network_args(&config);
        assert_eq!(args[..2], ["--socket-timeout", "15"]);
        assert!(args.windows(2).any(|w| w == ["--proxy", "socks5h://127.0.0.1:1080"]));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert!(args.windows(2).any(|w| w == ["--cookies-from-browser", "firefox"]));
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = run_output_with_timeout("ytgrab-definitely-missing-binary", &["--version"], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_times_out() {
        let err = run_output_with_timeout("sleep", &["5"], 1).await.unwrap_err();
        assert!(matches!(err, DownloadError::Timeout(_)));
    }
}
