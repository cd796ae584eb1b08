// Direct backend - we pick the stream, fetch the bytes, mux with ffmpeg
//
// Used when yt-dlp cannot finish the transfer itself. Metadata still comes
// from yt-dlp through the extractor orchestrator.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::extractors::{ExtractorConfig, ExtractorMode, InfoExtractorOrchestrator};
use crate::downloader::fetch::HttpFetcher;
use crate::downloader::format_selector::{FormatSelector, StreamSelection};
use crate::downloader::models::{DownloadOutcome, DownloadRequest, StreamFormat};
use crate::downloader::muxer::Muxer;
use crate::downloader::progress::{Phase, ProgressEvent};
use crate::downloader::traits::{DownloaderBackend, ProgressSink};
use crate::downloader::utils::{format_size, sanitize_filename, validate_url};

pub struct DirectBackend {
    extractors: Arc<InfoExtractorOrchestrator>,
    muxer: Option<Muxer>,
    mode: ExtractorMode,
    info_timeout: u32,
    player_client: Option<String>,
}

impl DirectBackend {
    pub fn new(extractors: Arc<InfoExtractorOrchestrator>, muxer: Option<Muxer>) -> Self {
        Self {
            extractors,
            muxer,
            mode: ExtractorMode::Auto,
            info_timeout: 30,
            player_client: None,
        }
    }

    pub fn with_extractor_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_info_timeout(mut self, seconds: u32) -> Self {
        self.info_timeout = seconds;
        self
    }

    pub fn with_player_client(mut self, client: Option<String>) -> Self {
        self.player_client = client;
        self
    }

    async fn fetch_stream(
        &self,
        fetcher: &HttpFetcher,
        format: &StreamFormat,
        dest: &Path,
        label: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, DownloadError> {
        let url = format.url.as_deref().ok_or_else(|| {
            DownloadError::Unavailable(format!("format {} has no direct URL", format.format_id))
        })?;

        sink.emit(ProgressEvent::status(
            Phase::Downloading,
            format!(
                "Downloading {} ({}, {})",
                label,
                format.resolution_label(),
                format
                    .effective_size()
                    .map(format_size)
                    .unwrap_or_else(|| "unknown size".to_string())
            ),
        ));
        debug!("[Direct] Fetching format {} to {}", format.format_id, dest.display());

        fetcher
            .fetch_to_file(
                url,
                &format.http_headers,
                dest,
                format.effective_size(),
                |downloaded, total| sink.emit(ProgressEvent::bytes(downloaded, total)),
            )
            .await?;
        Ok(dest.to_path_buf())
    }

    /// Fetch video and audio separately, then merge into `<stem>.mp4`.
    /// A failed merge keeps the video-only file.
    async fn download_and_merge(
        &self,
        fetcher: &HttpFetcher,
        muxer: &Muxer,
        video: &StreamFormat,
        audio: &StreamFormat,
        dir: &Path,
        stem: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(PathBuf, bool), DownloadError> {
        let video_path = self
            .fetch_stream(fetcher, video, &part_path(dir, stem, video), "video", sink)
            .await?;
        let audio_path = self
            .fetch_stream(fetcher, audio, &part_path(dir, stem, audio), "audio", sink)
            .await?;

        sink.emit(ProgressEvent::status(
            Phase::PostProcessing,
            "Merging video and audio...",
        ));
        let merged = dir.join(format!("merged_{}.mp4", stem));
        match muxer.merge(&video_path, &audio_path, &merged).await {
            Ok(merged) => {
                let final_path = dir.join(format!("{}.mp4", stem));
                tokio::fs::rename(&merged, &final_path).await?;
                Ok((final_path, true))
            }
            Err(e) => {
                warn!("[Direct] Merge failed: {}", e);
                sink.emit(ProgressEvent::Warning(format!(
                    "Could not merge audio ({}); keeping video without sound",
                    e
                )));
                Ok((video_path, false))
            }
        }
    }

    async fn warn_if_silent(&self, path: &Path, sink: &dyn ProgressSink) {
        let Some(muxer) = &self.muxer else {
            return;
        };
        match muxer.has_audio(path).await {
            Ok(Some(false)) => sink.emit(ProgressEvent::Warning(format!(
                "{} has no audio track",
                path.display()
            ))),
            Ok(_) => {}
            Err(e) => debug!("[Direct] Audio check skipped: {}", e),
        }
    }
}

/// `<dir>/<stem>.f<id>.<ext>` for one half of a merge
fn part_path(dir: &Path, stem: &str, format: &StreamFormat) -> PathBuf {
    dir.join(format!("{}.f{}.{}", stem, format.format_id, extension(format)))
}

fn extension(format: &StreamFormat) -> &str {
    if format.ext.is_empty() {
        "mp4"
    } else {
        &format.ext
    }
}

#[async_trait]
impl DownloaderBackend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        validate_url(&request.url)?;

        sink.emit(ProgressEvent::status(Phase::Resolving, "Fetching video info..."));
        let config = ExtractorConfig::default()
            .with_mode(self.mode)
            .with_network(request.network.clone())
            .with_timeout(self.info_timeout)
            .with_player_client(self.player_client.clone());
        let info = self.extractors.extract(&request.url, &config).await?;
        sink.emit(ProgressEvent::Started {
            title: info.title.clone(),
        });

        let selection: StreamSelection<'_> = match &request.format_id {
            Some(id) => FormatSelector::select_by_id(&info.formats, id).ok_or_else(|| {
                DownloadError::Unavailable(format!("format {} is not directly downloadable", id))
            })?,
            None => FormatSelector::select(&info.formats, request.quality).ok_or_else(|| {
                DownloadError::Unavailable(format!(
                    "no directly downloadable stream for {}",
                    request.quality
                ))
            })?,
        };

        if !selection.exact {
            sink.emit(ProgressEvent::Warning(format!(
                "{} is not available, downloading {} instead",
                request.quality,
                selection.primary.resolution_label()
            )));
        }
        info!(
            "[Direct] Selected format {} ({}){}",
            selection.primary.format_id,
            selection.primary.resolution_label(),
            selection
                .audio
                .map(|a| format!(" + audio {}", a.format_id))
                .unwrap_or_default()
        );

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let fetcher = HttpFetcher::new(&request.network)?;
        let stem = sanitize_filename(&info.title);
        let dir = request.output_dir.as_path();
        let single_path = dir.join(format!("{}.{}", stem, extension(selection.primary)));

        let (path, merged) = match (selection.audio, &self.muxer) {
            (Some(audio), Some(muxer)) => {
                self.download_and_merge(&fetcher, muxer, selection.primary, audio, dir, &stem, sink)
                    .await?
            }
            (Some(_), None) => {
                sink.emit(ProgressEvent::Warning(
                    "ffmpeg not found: downloading video without audio".to_string(),
                ));
                let path = self
                    .fetch_stream(&fetcher, selection.primary, &single_path, "video", sink)
                    .await?;
                (path, false)
            }
            (None, _) if request.quality.is_audio() => {
                let path = self
                    .fetch_stream(&fetcher, selection.primary, &single_path, "audio", sink)
                    .await?;
                let path = match &self.muxer {
                    Some(muxer) => {
                        sink.emit(ProgressEvent::status(
                            Phase::PostProcessing,
                            "Converting audio to mp3...",
                        ));
                        match muxer.to_mp3(&path).await {
                            Ok(mp3) => mp3,
                            Err(e) => {
                                warn!("[Direct] mp3 conversion failed: {}", e);
                                sink.emit(ProgressEvent::Warning(format!(
                                    "mp3 conversion failed ({}); keeping {}",
                                    e,
                                    path.display()
                                )));
                                path
                            }
                        }
                    }
                    None => {
                        sink.emit(ProgressEvent::Warning(
                            "ffmpeg not found: audio kept in its original format".to_string(),
                        ));
                        path
                    }
                };
                return Ok(DownloadOutcome {
                    path,
                    backend: self.name(),
                    merged: false,
                });
            }
            (None, _) => {
                let path = self
                    .fetch_stream(&fetcher, selection.primary, &single_path, "video", sink)
                    .await?;
                (path, false)
            }
        };

        self.warn_if_silent(&path, sink).await;

        Ok(DownloadOutcome {
            path,
            backend: self.name(),
            merged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{Quality, VideoInfo};
    use crate::downloader::progress::CollectingSink;
    use crate::downloader::test_support::{serve_files, static_orchestrator};

    fn stream(base: &str, id: &str, height: Option<u32>, vcodec: &str, acodec: &str, ext: &str) -> StreamFormat {
        StreamFormat {
            format_id: id.to_string(),
            ext: ext.to_string(),
            height,
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            url: Some(format!("{}/{}", base, id)),
            protocol: Some("http".to_string()),
            ..Default::default()
        }
    }

    fn info(formats: Vec<StreamFormat>) -> VideoInfo {
        VideoInfo {
            id: "abc".to_string(),
            title: "My: Video?".to_string(),
            uploader: "someone".to_string(),
            duration_seconds: Some(10),
            thumbnail: None,
            webpage_url: None,
            formats,
        }
    }

    #[tokio::test]
    async fn test_progressive_download() {
        let body = vec![1u8; 10_000];
        let base = serve_files(vec![("18", body.clone())]).await;
        let orchestrator = static_orchestrator(info(vec![stream(
            &base, "18", Some(360), "avc1.42001E", "mp4a.40.2", "mp4",
        )]));
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectBackend::new(Arc::new(orchestrator), None);
        let request = DownloadRequest::new("https://youtu.be/abc", Quality::Height(360), dir.path());
        let sink = CollectingSink::default();

        let outcome = backend.download(&request, &sink).await.unwrap();

        assert_eq!(outcome.path, dir.path().join("My Video.mp4"));
        assert!(!outcome.merged);
        assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
        assert_eq!(sink.percents().last().copied(), Some(100.0));
        assert!(sink.warnings().is_empty());
        assert!(sink
            .events()
            .contains(&ProgressEvent::Started { title: "My: Video?".to_string() }));
    }

    #[tokio::test]
    async fn test_fallback_resolution_warns() {
        let base = serve_files(vec![("18", vec![0u8; 100])]).await;
        let orchestrator = static_orchestrator(info(vec![stream(
            &base, "18", Some(360), "avc1", "mp4a.40.2", "mp4",
        )]));
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectBackend::new(Arc::new(orchestrator), None);
        let request = DownloadRequest::new("https://youtu.be/abc", Quality::Height(1080), dir.path());
        let sink = CollectingSink::default();

        backend.download(&request, &sink).await.unwrap();
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.warnings()[0].contains("1080p"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_only_is_merged_with_audio() {
        use crate::downloader::test_support::write_script;

        let base = serve_files(vec![("137", vec![1u8; 500]), ("140", vec![2u8; 200])]).await;
        let orchestrator = static_orchestrator(info(vec![
            stream(&base, "137", Some(1080), "avc1.640028", "none", "mp4"),
            stream(&base, "140", None, "none", "mp4a.40.2", "m4a"),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(
            tools.path(),
            "ffmpeg",
            "for a in \"$@\"; do last=\"$a\"; done\necho muxed > \"$last\"",
        );
        let backend = DirectBackend::new(Arc::new(orchestrator), Some(Muxer::with_paths(ffmpeg, None)));
        let request = DownloadRequest::new("https://youtu.be/abc", Quality::Height(1080), dir.path());
        let sink = CollectingSink::default();

        let outcome = backend.download(&request, &sink).await.unwrap();

        assert!(outcome.merged);
        assert_eq!(outcome.path, dir.path().join("My Video.mp4"));
        assert_eq!(std::fs::read_to_string(&outcome.path).unwrap().trim(), "muxed");
        assert!(!dir.path().join("My Video.f137.mp4").exists());
        assert!(!dir.path().join("merged_My Video.mp4").exists());
    }

    #[tokio::test]
    async fn test_video_only_without_ffmpeg_warns() {
        let base = serve_files(vec![("137", vec![1u8; 500]), ("140", vec![2u8; 200])]).await;
        let orchestrator = static_orchestrator(info(vec![
            stream(&base, "137", Some(1080), "avc1.640028", "none", "mp4"),
            stream(&base, "140", None, "none", "mp4a.40.2", "m4a"),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectBackend::new(Arc::new(orchestrator), None);
        let request = DownloadRequest::new("https://youtu.be/abc", Quality::Best, dir.path());
        let sink = CollectingSink::default();

        let outcome = backend.download(&request, &sink).await.unwrap();
        assert!(!outcome.merged);
        assert_eq!(outcome.path, dir.path().join("My Video.mp4"));
        assert!(sink.warnings().iter().any(|w| w.contains("without audio")));
    }

    #[tokio::test]
    async fn test_no_direct_stream_is_unavailable() {
        let mut hls = stream("http://127.0.0.1:9", "96", Some(1080), "avc1", "mp4a", "mp4");
        hls.protocol = Some("m3u8_native".to_string());
        let orchestrator = static_orchestrator(info(vec![hls]));
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectBackend::new(Arc::new(orchestrator), None);
        let request = DownloadRequest::new("https://youtu.be/abc", Quality::Best, dir.path());

        let err = backend
            .download(&request, &CollectingSink::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Unavailable(_)));
    }
}
