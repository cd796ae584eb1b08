// Orchestrator with retry and fallback logic
//
// Backends are tried in order; each one gets the full retry budget before
// the next is asked. A failure that no backend can fix (bad URL, removed
// video) ends the download at once.

use std::sync::Arc;
use tracing::{info, warn};

use super::backends::{DirectBackend, YtDlpBackend};
use super::errors::DownloadError;
use super::extractors::{ExtractorConfig, ExtractorMode, InfoExtractorOrchestrator};
use super::format_selector::FormatSelector;
use super::models::{DownloadOutcome, DownloadRequest, Engine, NetworkConfig, VideoInfo};
use super::muxer::Muxer;
use super::progress::ProgressEvent;
use super::retry::{RetryEvent, RetryPolicy};
use super::traits::{DownloaderBackend, ProgressSink};
use super::utils::find_executable;
use crate::config::Settings;

pub struct Downloader {
    backends: Vec<Box<dyn DownloaderBackend>>,
    extractors: Arc<InfoExtractorOrchestrator>,
    retry: RetryPolicy,
    extractor_mode: ExtractorMode,
    info_timeout: u32,
    player_client: Option<String>,
}

impl Downloader {
    pub fn with_backends(
        backends: Vec<Box<dyn DownloaderBackend>>,
        extractors: Arc<InfoExtractorOrchestrator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backends,
            extractors,
            retry,
            extractor_mode: ExtractorMode::Auto,
            info_timeout: 30,
            player_client: None,
        }
    }

    /// Wire backends for the configured engine
    pub fn from_settings(settings: &Settings) -> Self {
        let muxer = Muxer::detect();
        if muxer.is_none() {
            warn!("[Downloader] ffmpeg not found: no merging or mp3 conversion");
        }

        let aria2 = if settings.use_aria2 {
            let found = find_executable("aria2c");
            if found.is_none() {
                warn!("[Downloader] aria2c requested but not installed, using yt-dlp's downloader");
            }
            found
        } else {
            None
        };

        let extractors = Arc::new(InfoExtractorOrchestrator::new());
        let ytdlp = || -> Box<dyn DownloaderBackend> {
            Box::new(
                YtDlpBackend::new(muxer.clone())
                    .with_concurrent_fragments(settings.concurrent_fragments)
                    .with_aria2(aria2.clone()),
            )
        };
        let direct = || -> Box<dyn DownloaderBackend> {
            Box::new(
                DirectBackend::new(extractors.clone(), muxer.clone())
                    .with_extractor_mode(settings.extractor)
                    .with_info_timeout(settings.info_timeout_secs)
                    .with_player_client(settings.player_client.clone()),
            )
        };

        let backends = match settings.engine {
            Engine::Auto => vec![ytdlp(), direct()],
            Engine::YtDlp => vec![ytdlp()],
            Engine::Direct => vec![direct()],
        };

        let mut downloader = Self::with_backends(backends, extractors.clone(), settings.retry_policy());
        downloader.extractor_mode = settings.extractor;
        downloader.info_timeout = settings.info_timeout_secs;
        downloader.player_client = settings.player_client.clone();
        downloader
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Download with retry per backend and fallback across backends.
    ///
    /// Emits `Finished` or `Failed` on `sink` before returning.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        let result = self.download_inner(request, sink).await;
        match &result {
            Ok(outcome) => sink.emit(ProgressEvent::Finished {
                path: outcome.path.clone(),
            }),
            Err(e) => sink.emit(ProgressEvent::Failed {
                message: e.to_string(),
            }),
        }
        result
    }

    async fn download_inner(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let mut last_error: Option<DownloadError> = None;
        // Once a handshake fails, later attempts and later backends skip certificate checks
        let mut relaxed = request.network.insecure_tls;

        for (index, backend) in self.backends.iter().enumerate() {
            info!("[Downloader] Trying backend: {}", backend.name());

            let result = self
                .retry
                .run(
                    |attempt, previous| {
                        if !relaxed && previous.map(DownloadError::is_tls).unwrap_or(false) {
                            warn!("[Downloader] TLS failure, attempt {} skips certificate checks", attempt);
                            relaxed = true;
                        }
                        let mut attempt_request = request.clone();
                        if relaxed {
                            attempt_request.network = request.network.relaxed();
                        }
                        async move { backend.download(&attempt_request, sink).await }
                    },
                    |event| sink.emit(ProgressEvent::Warning(retry_message(backend.name(), event))),
                )
                .await;

            match result {
                Ok(outcome) => {
                    info!("[Downloader] Success with {}: {}", backend.name(), outcome.path.display());
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!("[Downloader] {} failed: {}", backend.name(), e);
                    if e.is_tls() {
                        relaxed = true;
                    }
                    let stop = e.stops_fallback();
                    if !stop {
                        if let Some(next) = self.backends.get(index + 1) {
                            sink.emit(ProgressEvent::Warning(format!(
                                "{} failed ({}), trying {}",
                                backend.name(),
                                e.kind(),
                                next.name()
                            )));
                        }
                    }
                    last_error = Some(e);
                    if stop {
                        break;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DownloadError::Unknown("No download backends configured".to_string())))
    }

    /// Resolve metadata with the retry policy
    pub async fn get_video_info(&self, url: &str, network: &NetworkConfig) -> Result<VideoInfo, DownloadError> {
        let base = ExtractorConfig::default()
            .with_mode(self.extractor_mode)
            .with_timeout(self.info_timeout)
            .with_player_client(self.player_client.clone());
        let mut relaxed = network.insecure_tls;

        self.retry
            .run(
                |_, previous| {
                    if previous.map(DownloadError::is_tls).unwrap_or(false) {
                        relaxed = true;
                    }
                    let config = base.clone().with_network(if relaxed {
                        network.relaxed()
                    } else {
                        network.clone()
                    });
                    async move { self.extractors.extract(url, &config).await }
                },
                |event| {
                    warn!(
                        "[Downloader] Info attempt {}/{} failed, retrying in {:?}",
                        event.attempt, event.max_attempts, event.delay
                    )
                },
            )
            .await
    }

    /// Heights offered for `url`, highest first
    pub async fn list_resolutions(&self, url: &str, network: &NetworkConfig) -> Result<Vec<u32>, DownloadError> {
        let info = self.get_video_info(url, network).await?;
        Ok(FormatSelector::available_resolutions(&info.formats))
    }
}

fn retry_message(backend: &str, event: &RetryEvent<'_>) -> String {
    format!(
        "{}: attempt {}/{} failed ({}), retrying in {}s",
        backend,
        event.attempt,
        event.max_attempts,
        event.error,
        event.delay.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{Quality, StreamFormat};
    use crate::downloader::progress::CollectingSink;
    use crate::downloader::extractors::InfoExtractor;
    use crate::downloader::test_support::static_orchestrator;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend replaying scripted results and recording the TLS mode of each call
    struct ScriptedBackend {
        name: &'static str,
        results: Mutex<VecDeque<Result<DownloadOutcome, DownloadError>>>,
        insecure_calls: Arc<Mutex<Vec<bool>>>,
    }

    impl ScriptedBackend {
        fn boxed(
            name: &'static str,
            results: Vec<Result<DownloadOutcome, DownloadError>>,
        ) -> (Box<dyn DownloaderBackend>, Arc<Mutex<Vec<bool>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let backend = ScriptedBackend {
                name,
                results: Mutex::new(results.into()),
                insecure_calls: calls.clone(),
            };
            (Box::new(backend), calls)
        }
    }

    #[async_trait]
    impl DownloaderBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn download(
            &self,
            request: &DownloadRequest,
            _sink: &dyn ProgressSink,
        ) -> Result<DownloadOutcome, DownloadError> {
            self.insecure_calls.lock().unwrap().push(request.network.insecure_tls);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DownloadError::Network("script exhausted".into())))
        }
    }

    fn done(backend: &'static str) -> Result<DownloadOutcome, DownloadError> {
        Ok(DownloadOutcome {
            path: PathBuf::from(format!("/tmp/{}.mp4", backend)),
            backend,
            merged: false,
        })
    }

    fn empty_info() -> VideoInfo {
        VideoInfo {
            id: "abc".into(),
            title: "t".into(),
            uploader: "u".into(),
            duration_seconds: None,
            thumbnail: None,
            webpage_url: None,
            formats: Vec::new(),
        }
    }

    fn downloader(backends: Vec<Box<dyn DownloaderBackend>>, attempts: u32) -> Downloader {
        Downloader::with_backends(
            backends,
            Arc::new(static_orchestrator(empty_info())),
            RetryPolicy::new(attempts, Duration::ZERO),
        )
    }

    fn request(dir: &std::path::Path) -> DownloadRequest {
        DownloadRequest::new("https://youtu.be/abc", Quality::Height(720), dir)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (backend, calls) = ScriptedBackend::boxed(
            "first",
            vec![
                Err(DownloadError::Network("reset".into())),
                Err(DownloadError::Timeout("slow".into())),
                done("first"),
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let sink = CollectingSink::default();

        let outcome = downloader(vec![backend], 5)
            .download(&request(dir.path()), &sink)
            .await
            .unwrap();

        assert_eq!(outcome.backend, "first");
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(sink.warnings().len(), 2);
        assert!(matches!(sink.events().last(), Some(ProgressEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_tls_failure_relaxes_following_attempts() {
        let (backend, calls) = ScriptedBackend::boxed(
            "first",
            vec![
                Err(DownloadError::Tls("EOF occurred in violation of protocol".into())),
                Err(DownloadError::Network("reset".into())),
                done("first"),
            ],
        );
        let dir = tempfile::tempdir().unwrap();

        downloader(vec![backend], 5)
            .download(&request(dir.path()), &CollectingSink::default())
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![false, true, true]);
    }

    #[tokio::test]
    async fn test_tls_relaxation_carries_to_next_backend() {
        let (first, first_calls) = ScriptedBackend::boxed(
            "first",
            vec![
                Err(DownloadError::Tls("handshake".into())),
                Err(DownloadError::Tls("handshake".into())),
            ],
        );
        let (second, second_calls) = ScriptedBackend::boxed("second", vec![done("second")]);
        let dir = tempfile::tempdir().unwrap();

        let outcome = downloader(vec![first, second], 2)
            .download(&request(dir.path()), &CollectingSink::default())
            .await
            .unwrap();

        assert_eq!(outcome.backend, "second");
        assert_eq!(*first_calls.lock().unwrap(), vec![false, true]);
        assert_eq!(*second_calls.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_exhausted_backend_falls_back() {
        let (first, first_calls) = ScriptedBackend::boxed("first", vec![]);
        let (second, _) = ScriptedBackend::boxed("second", vec![done("second")]);
        let dir = tempfile::tempdir().unwrap();
        let sink = CollectingSink::default();

        let outcome = downloader(vec![first, second], 2)
            .download(&request(dir.path()), &sink)
            .await
            .unwrap();

        assert_eq!(outcome.backend, "second");
        assert_eq!(first_calls.lock().unwrap().len(), 2);
        assert!(sink.warnings().iter().any(|w| w.contains("trying second")));
    }

    #[tokio::test]
    async fn test_unavailable_video_stops_everything() {
        let (first, first_calls) =
            ScriptedBackend::boxed("first", vec![Err(DownloadError::Unavailable("private".into()))]);
        let (second, second_calls) = ScriptedBackend::boxed("second", vec![done("second")]);
        let dir = tempfile::tempdir().unwrap();
        let sink = CollectingSink::default();

        let err = downloader(vec![first, second], 5)
            .download(&request(dir.path()), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Unavailable(_)));
        assert_eq!(first_calls.lock().unwrap().len(), 1);
        assert!(second_calls.lock().unwrap().is_empty());
        assert!(matches!(sink.events().last(), Some(ProgressEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn test_missing_tool_falls_back_without_retry() {
        let (first, first_calls) =
            ScriptedBackend::boxed("first", vec![Err(DownloadError::ToolNotFound("yt-dlp".into()))]);
        let (second, _) = ScriptedBackend::boxed("second", vec![done("second")]);
        let dir = tempfile::tempdir().unwrap();

        let outcome = downloader(vec![first, second], 5)
            .download(&request(dir.path()), &CollectingSink::default())
            .await
            .unwrap();

        assert_eq!(outcome.backend, "second");
        assert_eq!(first_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_backends_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = downloader(vec![], 1)
            .download(&request(dir.path()), &CollectingSink::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Unknown(_)));
    }

    /// Records the player client each extraction asks for
    struct ClientRecorder {
        clients: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl InfoExtractor for ClientRecorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn extract(&self, _url: &str, config: &ExtractorConfig) -> Result<VideoInfo, DownloadError> {
            self.clients.lock().unwrap().push(config.player_client.clone());
            Ok(empty_info())
        }
    }

    #[tokio::test]
    async fn test_player_client_reaches_extractor() {
        let clients = Arc::new(Mutex::new(Vec::new()));
        let extractors = InfoExtractorOrchestrator::with_extractors(
            Box::new(ClientRecorder { clients: clients.clone() }),
            Box::new(ClientRecorder { clients: clients.clone() }),
        );
        let mut downloader = Downloader::with_backends(vec![], Arc::new(extractors), RetryPolicy::none());
        downloader.player_client = Some("tv".to_string());

        downloader
            .get_video_info("https://youtu.be/abc", &NetworkConfig::default())
            .await
            .unwrap();
        assert_eq!(*clients.lock().unwrap(), vec![Some("tv".to_string())]);
    }

    #[tokio::test]
    async fn test_list_resolutions() {
        let progressive = |id: &str, height: u32| StreamFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            height: Some(height),
            vcodec: Some("avc1".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            ..Default::default()
        };
        let mut info = empty_info();
        info.formats = vec![progressive("18", 360), progressive("22", 720), progressive("18b", 360)];
        let downloader = Downloader::with_backends(
            vec![],
            Arc::new(static_orchestrator(info)),
            RetryPolicy::none(),
        );

        let heights = downloader
            .list_resolutions("https://youtu.be/abc", &NetworkConfig::default())
            .await
            .unwrap();
        assert_eq!(heights, vec![720, 360]);
    }
}
