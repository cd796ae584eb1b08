// yt-dlp backend - yt-dlp drives the transfer, merge and audio extraction
//
// Progress comes from `--newline` stdout lines; stderr is collected for
// error classification and benign warnings.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::extractors::{diagnose_error, is_benign_warning, FailureReason};
use crate::downloader::format_selector::{FormatSelector, FALLBACK_SPEC};
use crate::downloader::models::{DownloadOutcome, DownloadRequest, Quality};
use crate::downloader::muxer::Muxer;
use crate::downloader::progress::{Phase, ProgressEvent};
use crate::downloader::traits::{DownloaderBackend, ProgressSink};
use crate::downloader::utils::{find_executable, network_args, parse_size, spawn_error, validate_url};

lazy_static! {
    // [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
    static ref PROGRESS_RE: Regex = Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?)%\s+of\s+~?\s*(\S+)(?:\s+in\s+\S+)?(?:\s+at\s+(.+?))?(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?\s*$"
    ).unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").unwrap();
    static ref MERGE_RE: Regex = Regex::new(r#"^\[Merger\]\s+Merging formats into\s+"(.+)"$"#).unwrap();
    static ref AUDIO_RE: Regex = Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(.+)$").unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
}

/// One meaningful line of yt-dlp stdout
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputLine {
    Progress {
        percent: f32,
        total: Option<u64>,
        speed: Option<String>,
        eta: Option<String>,
        fragment: Option<(u32, u32)>,
    },
    Destination(PathBuf),
    Merging(PathBuf),
    AudioDestination(PathBuf),
    AlreadyDownloaded(PathBuf),
}

/// Parse one yt-dlp stdout line
pub(crate) fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim_end();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let total = caps.get(2).and_then(|m| parse_size(m.as_str()));
        let speed = caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.starts_with("Unknown"));
        let eta = caps
            .get(4)
            .map(|m| m.as_str().to_string())
            .filter(|s| s != "Unknown");
        let fragment = match (caps.get(5), caps.get(6)) {
            (Some(cur), Some(all)) => cur.as_str().parse().ok().zip(all.as_str().parse().ok()),
            _ => None,
        };
        return Some(OutputLine::Progress {
            percent,
            total,
            speed,
            eta,
            fragment,
        });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return Some(OutputLine::Destination(PathBuf::from(caps.get(1)?.as_str())));
    }
    if let Some(caps) = MERGE_RE.captures(line) {
        return Some(OutputLine::Merging(PathBuf::from(caps.get(1)?.as_str())));
    }
    if let Some(caps) = AUDIO_RE.captures(line) {
        return Some(OutputLine::AudioDestination(PathBuf::from(caps.get(1)?.as_str())));
    }
    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(OutputLine::AlreadyDownloaded(PathBuf::from(caps.get(1)?.as_str())));
    }

    None
}

/// What one yt-dlp run produced
#[derive(Debug, Default)]
struct RunReport {
    final_path: Option<PathBuf>,
    merged: bool,
}

pub struct YtDlpBackend {
    ytdlp_path: PathBuf,
    muxer: Option<Muxer>,
    concurrent_fragments: u32,
    aria2: Option<PathBuf>,
}

impl YtDlpBackend {
    pub fn new(muxer: Option<Muxer>) -> Self {
        Self::with_binary(
            find_executable("yt-dlp").unwrap_or_else(|| PathBuf::from("yt-dlp")),
            muxer,
        )
    }

    pub fn with_binary(path: impl Into<PathBuf>, muxer: Option<Muxer>) -> Self {
        Self {
            ytdlp_path: path.into(),
            muxer,
            concurrent_fragments: 8,
            aria2: None,
        }
    }

    pub fn with_concurrent_fragments(mut self, fragments: u32) -> Self {
        self.concurrent_fragments = fragments.max(1);
        self
    }

    /// Hand transfers to aria2c at `path`
    pub fn with_aria2(mut self, path: Option<PathBuf>) -> Self {
        self.aria2 = path;
        self
    }

    fn format_spec(&self, request: &DownloadRequest) -> String {
        match &request.format_id {
            Some(id) => id.clone(),
            None => FormatSelector::format_spec(request.quality, self.muxer.is_some()),
        }
    }

    fn build_args(&self, request: &DownloadRequest, spec: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            spec.to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-update".to_string(),
            "--retries".to_string(),
            "10".to_string(),
            "--fragment-retries".to_string(),
            "10".to_string(),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "-P".to_string(),
            request.output_dir.to_string_lossy().to_string(),
            // Default template is "%(title)s [%(id)s].%(ext)s"; drop the id
            "-o".to_string(),
            "%(title)s.%(ext)s".to_string(),
        ];

        if let Some(muxer) = &self.muxer {
            args.push("--ffmpeg-location".to_string());
            args.push(muxer.ffmpeg_path().to_string_lossy().to_string());
            if request.quality.is_audio() {
                args.extend(["-x", "--audio-format", "mp3"].map(String::from));
            } else {
                args.extend(["--merge-output-format", "mp4"].map(String::from));
            }
        }

        args.extend(network_args(&request.network));

        if let Some(aria2) = &self.aria2 {
            args.push("--external-downloader".to_string());
            args.push(aria2.to_string_lossy().to_string());
            args.push("--external-downloader-args".to_string());
            args.push("aria2c:-x 16 -s 16 -k 1M".to_string());
        }

        args.push(request.url.clone());
        args
    }

    /// Run yt-dlp once with `spec`, streaming progress into `sink`
    async fn run_once(
        &self,
        request: &DownloadRequest,
        spec: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, DownloadError> {
        let args = self.build_args(request, spec);
        debug!("[YtDlp] Running: {} {}", self.ytdlp_path.display(), args.join(" "));

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(self.ytdlp_path.as_os_str(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Execution("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Execution("Failed to capture stderr".to_string()))?;

        let read_stdout = async {
            let mut report = RunReport::default();
            let mut last_percent = 0.0f32;
            let mut lines = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let Some(parsed) = parse_line(&line) else {
                    continue;
                };
                match parsed {
                    OutputLine::Progress {
                        percent,
                        total,
                        speed,
                        eta,
                        ..
                    } => {
                        // Fragment retries can briefly report a lower figure
                        if percent < last_percent {
                            continue;
                        }
                        last_percent = percent;
                        sink.emit(ProgressEvent::Progress {
                            percent,
                            downloaded: total.map(|t| (t as f64 * percent as f64 / 100.0) as u64),
                            total,
                            speed,
                            eta,
                        });
                    }
                    OutputLine::Destination(path) => {
                        debug!("[yt-dlp] {}", line);
                        // Each destination starts a new transfer
                        last_percent = 0.0;
                        sink.emit(ProgressEvent::status(
                            Phase::Downloading,
                            format!("Downloading {}", file_label(&path)),
                        ));
                        report.final_path = Some(path);
                    }
                    OutputLine::Merging(path) => {
                        debug!("[yt-dlp] {}", line);
                        sink.emit(ProgressEvent::status(
                            Phase::PostProcessing,
                            "Merging video and audio...",
                        ));
                        report.merged = true;
                        report.final_path = Some(path);
                    }
                    OutputLine::AudioDestination(path) => {
                        debug!("[yt-dlp] {}", line);
                        sink.emit(ProgressEvent::status(
                            Phase::PostProcessing,
                            "Converting audio to mp3...",
                        ));
                        report.final_path = Some(path);
                    }
                    OutputLine::AlreadyDownloaded(path) => {
                        info!("[YtDlp] Already downloaded: {}", path.display());
                        report.final_path = Some(path);
                    }
                }
            }
            report
        };

        let read_stderr = async {
            let mut collected = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if is_benign_warning(&line) {
                    warn!("[YtDlp] Benign warning: {}", line.trim());
                    sink.emit(ProgressEvent::Warning(line.trim().to_string()));
                } else if line.starts_with("WARNING:") {
                    debug!("[yt-dlp] {}", line);
                }
                collected.push(line);
            }
            collected.join("\n")
        };

        let (report, stderr_text) = tokio::join!(read_stdout, read_stderr);

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::Execution(format!("Process error: {}", e)))?;

        if status.success() {
            Ok(report)
        } else {
            warn!("[YtDlp] Exited with {}: {}", status, last_error_line(&stderr_text));
            Err(DownloadError::from(stderr_text))
        }
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn last_error_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("no output")
}

#[async_trait]
impl DownloaderBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        validate_url(&request.url)?;

        if request.quality.is_audio() && self.muxer.is_none() {
            sink.emit(ProgressEvent::Warning(
                "ffmpeg not found: audio is saved in its original format instead of mp3".to_string(),
            ));
        }

        let spec = self.format_spec(request);
        sink.emit(ProgressEvent::status(
            Phase::Downloading,
            format!("Starting yt-dlp ({})", spec),
        ));

        let report = match self.run_once(request, &spec, sink).await {
            Ok(report) => report,
            Err(e) if spec != FALLBACK_SPEC && format_unavailable(&e) => {
                warn!("[YtDlp] Format '{}' not available, retrying with '{}'", spec, FALLBACK_SPEC);
                sink.emit(ProgressEvent::Warning(format!(
                    "Requested quality is not available, downloading '{}' instead",
                    FALLBACK_SPEC
                )));
                self.run_once(request, FALLBACK_SPEC, sink).await?
            }
            Err(e) => return Err(e),
        };

        let path = match report.final_path {
            Some(path) => path,
            None => {
                sink.emit(ProgressEvent::Warning(
                    "yt-dlp did not report the output file name".to_string(),
                ));
                request.output_dir.clone()
            }
        };

        if request.quality != Quality::AudioOnly && path.is_file() {
            if let Some(muxer) = &self.muxer {
                match muxer.has_audio(&path).await {
                    Ok(Some(false)) => sink.emit(ProgressEvent::Warning(format!(
                        "{} has no audio track",
                        file_label(&path)
                    ))),
                    Ok(_) => {}
                    Err(e) => debug!("[YtDlp] Audio check skipped: {}", e),
                }
            }
        }

        info!("[YtDlp] Finished: {}", path.display());
        Ok(DownloadOutcome {
            path,
            backend: self.name(),
            merged: report.merged,
        })
    }
}

fn format_unavailable(error: &DownloadError) -> bool {
    matches!(
        diagnose_error(&error.to_string()),
        Some(FailureReason::FormatUnavailable)
    )
}
