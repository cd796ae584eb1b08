// Download session - one worker task per download, events back to the owner
//
// Workers never touch records; they only send `ProgressUpdate`s. The owner
// drains the channel and folds each event into the matching record.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::models::DownloadRequest;
use super::orchestrator::Downloader;
use super::progress::{ChannelSink, Phase, ProgressEvent, ProgressUpdate};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DownloadStatus {
    Pending,
    Resolving,
    Downloading,
    PostProcessing,
    Completed { path: PathBuf },
    Failed { message: String },
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// In-memory state of one submitted download
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub id: usize,
    pub request: DownloadRequest,
    pub title: Option<String>,
    pub status: DownloadStatus,
    /// 0-100, never decreases
    pub progress: f32,
    pub warnings: Vec<String>,
}

impl DownloadRecord {
    pub fn new(id: usize, request: DownloadRequest) -> Self {
        Self {
            id,
            request,
            title: None,
            status: DownloadStatus::Pending,
            progress: 0.0,
            warnings: Vec::new(),
        }
    }

    /// Fold one event into the record. Events after completion or failure
    /// are ignored.
    pub fn apply(&mut self, event: &ProgressEvent) {
        if self.status.is_terminal() {
            return;
        }

        match event {
            ProgressEvent::Started { title } => {
                self.title = Some(title.clone());
            }
            ProgressEvent::Status { phase, .. } => {
                self.status = match phase {
                    Phase::Resolving => DownloadStatus::Resolving,
                    Phase::Downloading => DownloadStatus::Downloading,
                    Phase::PostProcessing => DownloadStatus::PostProcessing,
                };
            }
            ProgressEvent::Progress { percent, .. } => {
                if matches!(self.status, DownloadStatus::Pending | DownloadStatus::Resolving) {
                    self.status = DownloadStatus::Downloading;
                }
                let percent = percent.clamp(0.0, 100.0);
                if percent > self.progress {
                    self.progress = percent;
                }
            }
            ProgressEvent::Warning(message) => self.warnings.push(message.clone()),
            ProgressEvent::Finished { path } => {
                self.status = DownloadStatus::Completed { path: path.clone() };
                self.progress = 100.0;
            }
            ProgressEvent::Failed { message } => {
                self.status = DownloadStatus::Failed {
                    message: message.clone(),
                };
            }
        }
    }
}

/// Owner of the record list and the event channel
pub struct Session {
    downloader: Arc<Downloader>,
    records: Vec<DownloadRecord>,
    tx: UnboundedSender<ProgressUpdate>,
    rx: UnboundedReceiver<ProgressUpdate>,
    active: usize,
}

impl Session {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            downloader,
            records: Vec::new(),
            tx,
            rx,
            active: 0,
        }
    }

    /// Create a record and start its worker. Returns the record id.
    pub fn submit(&mut self, request: DownloadRequest) -> usize {
        let id = self.records.len();
        self.records.push(DownloadRecord::new(id, request.clone()));
        self.active += 1;

        let downloader = self.downloader.clone();
        let sink = ChannelSink::new(id, self.tx.clone());
        tokio::spawn(async move {
            debug!("[Session] Worker {} started for {}", id, request.url);
            // Result reaches the owner as a Finished/Failed event
            let _ = downloader.download(&request, &sink).await;
        });
        id
    }

    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    pub fn record(&self, id: usize) -> Option<&DownloadRecord> {
        self.records.get(id)
    }

    /// Downloads that have not finished or failed yet
    pub fn active(&self) -> usize {
        self.active
    }

    /// Apply an update to its record
    pub fn apply(&mut self, update: &ProgressUpdate) {
        let Some(record) = self.records.get_mut(update.id) else {
            return;
        };
        let was_terminal = record.status.is_terminal();
        record.apply(&update.event);
        if !was_terminal && record.status.is_terminal() {
            self.active = self.active.saturating_sub(1);
        }
    }

    /// Wait for the next event, apply it and hand it back.
    /// `None` once every download has ended and the queue is drained.
    pub async fn next_event(&mut self) -> Option<ProgressUpdate> {
        let update = if self.active == 0 {
            self.rx.try_recv().ok()?
        } else {
            self.rx.recv().await?
        };
        self.apply(&update);
        Some(update)
    }

    /// Process events until every submitted download has ended
    pub async fn run_until_idle(&mut self) {
        while self.next_event().await.is_some() {}
    }
}
