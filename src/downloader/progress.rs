// Progress events and the sinks that consume them

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::traits::ProgressSink;
use super::utils::format_size;

/// Coarse stage of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Resolving,
    Downloading,
    PostProcessing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressEvent {
    /// Metadata resolved; the transfer is about to begin
    Started { title: String },
    Status { phase: Phase, message: String },
    Progress {
        percent: f32,
        downloaded: Option<u64>,
        total: Option<u64>,
        speed: Option<String>,
        eta: Option<String>,
    },
    Warning(String),
    Finished { path: PathBuf },
    Failed { message: String },
}

impl ProgressEvent {
    pub fn status(phase: Phase, message: impl Into<String>) -> Self {
        Self::Status {
            phase,
            message: message.into(),
        }
    }

    /// Byte-count progress from a streaming fetch
    pub fn bytes(downloaded: u64, total: Option<u64>) -> Self {
        let percent = match total {
            Some(t) if t > 0 => (downloaded as f64 / t as f64 * 100.0) as f32,
            _ => 0.0,
        };
        Self::Progress {
            percent: percent.clamp(0.0, 100.0),
            downloaded: Some(downloaded),
            total,
            speed: None,
            eta: None,
        }
    }
}

/// Event tagged with the session download it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub id: usize,
    pub event: ProgressEvent,
}

/// Forwards events to a session over a channel
pub struct ChannelSink {
    id: usize,
    tx: UnboundedSender<ProgressUpdate>,
}

impl ChannelSink {
    pub fn new(id: usize, tx: UnboundedSender<ProgressUpdate>) -> Self {
        Self { id, tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means the session was dropped; nobody is listening
        let _ = self.tx.send(ProgressUpdate { id: self.id, event });
    }
}

/// Single progress bar on stderr for the CLI
pub struct TerminalSink {
    bar: ProgressBar,
    last_percent: Mutex<f32>,
}

impl TerminalSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.green/blue}] {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        Self {
            bar,
            last_percent: Mutex::new(0.0),
        }
    }

    fn progress_message(
        percent: f32,
        downloaded: Option<u64>,
        total: Option<u64>,
        speed: &Option<String>,
        eta: &Option<String>,
    ) -> String {
        let mut msg = format!("{:5.1}%", percent);
        match (downloaded, total) {
            (Some(d), Some(t)) => msg.push_str(&format!(" {} / {}", format_size(d), format_size(t))),
            (None, Some(t)) => msg.push_str(&format!(" of {}", format_size(t))),
            _ => {}
        }
        if let Some(speed) = speed {
            msg.push_str(&format!(" at {}", speed));
        }
        if let Some(eta) = eta {
            msg.push_str(&format!(" ETA {}", eta));
        }
        msg
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { title } => {
                self.bar.println(format!("Title: {}", title));
            }
            ProgressEvent::Status { message, .. } => {
                self.bar.set_message(message);
            }
            ProgressEvent::Progress {
                percent,
                downloaded,
                total,
                speed,
                eta,
            } => {
                if let Ok(mut last) = self.last_percent.lock() {
                    // A drop means a new transfer (e.g. the audio track) started
                    if percent + 0.01 < *last {
                        self.bar.reset();
                    }
                    *last = percent;
                }
                self.bar.set_position((percent.clamp(0.0, 100.0) * 10.0) as u64);
                self.bar
                    .set_message(Self::progress_message(percent, downloaded, total, &speed, &eta));
            }
            ProgressEvent::Warning(message) => {
                self.bar.println(format!("Warning: {}", message));
            }
            ProgressEvent::Finished { path } => {
                self.bar.set_position(1000);
                self.bar
                    .finish_with_message(format!("Saved to {}", path.display()));
            }
            ProgressEvent::Failed { message } => {
                self.bar.abandon_with_message(format!("Failed: {}", message));
            }
        }
    }
}

/// Records every event; used by tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
