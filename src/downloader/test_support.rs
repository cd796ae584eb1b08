// Fixtures shared by unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::errors::DownloadError;
use super::extractors::{ExtractorConfig, InfoExtractor, InfoExtractorOrchestrator};
use super::models::VideoInfo;

/// Trimmed `yt-dlp --dump-json` output: a storyboard, one progressive
/// stream, one video-only stream and one AAC audio stream
pub const SAMPLE_JSON: &str = r#"{"id":"dQw4w9WgXcQ","title":"Sample Video","uploader":"Uploader","duration":212.0,"webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","formats":[{"format_id":"sb0","ext":"mhtml","vcodec":"none","acodec":"none"},{"format_id":"18","ext":"mp4","width":640,"height":360,"vcodec":"avc1.42001E","acodec":"mp4a.40.2","filesize":1000,"url":"https://cdn.example/18","protocol":"https","http_headers":{"User-Agent":"UA"}},{"format_id":"137","ext":"mp4","width":1920,"height":1080,"vcodec":"avc1.640028","acodec":"none","filesize_approx":50000.0,"tbr":4000.5,"url":"https://cdn.example/137","protocol":"https"},{"format_id":"140","ext":"m4a","vcodec":"none","acodec":"mp4a.40.2","abr":129.5,"url":"https://cdn.example/140","protocol":"https"}]}"#;

/// Write an executable shell script standing in for an external tool
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Extractor that always answers with the same result
pub struct StaticExtractor {
    pub result: Result<VideoInfo, DownloadError>,
}

#[async_trait]
impl InfoExtractor for StaticExtractor {
    fn name(&self) -> &'static str {
        "static"
    }

    fn is_available(&self) -> bool {
        !matches!(self.result, Err(DownloadError::ToolNotFound(_)))
    }

    async fn extract(&self, _url: &str, _config: &ExtractorConfig) -> Result<VideoInfo, DownloadError> {
        self.result.clone()
    }
}

/// Orchestrator whose CLI extractor returns `info`; Python is "not installed"
pub fn static_orchestrator(info: VideoInfo) -> InfoExtractorOrchestrator {
    InfoExtractorOrchestrator::with_extractors(
        Box::new(StaticExtractor {
            result: Err(DownloadError::ToolNotFound("python".to_string())),
        }),
        Box::new(StaticExtractor { result: Ok(info) }),
    )
}

/// HTTP server on 127.0.0.1 answering `GET /<name>` with the matching body.
/// Unknown paths get a 404. Returns the base URL.
pub async fn serve_files(files: Vec<(&'static str, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        files
            .into_iter()
            .map(|(name, body)| (format!("/{}", name), body))
            .collect(),
    );

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let files = files.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = match files.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", Vec::new()),
                };
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}
