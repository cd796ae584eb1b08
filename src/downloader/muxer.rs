// Muxer - ffmpeg/ffprobe post-processing
//
// Handles:
// - Merging a video-only stream with an audio stream into mp4
// - Converting a downloaded audio stream to mp3
// - Checking whether a finished file carries an audio track

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::utils::{find_executable, spawn_error};

/// ffmpeg (required) and ffprobe (optional) locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Muxer {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
}

impl Muxer {
    /// Locate ffmpeg and ffprobe; `None` when ffmpeg is missing
    pub fn detect() -> Option<Self> {
        let ffmpeg = find_executable("ffmpeg")?;
        let ffprobe = find_executable("ffprobe");
        debug!(
            "[Muxer] ffmpeg at {}, ffprobe {}",
            ffmpeg.display(),
            ffprobe
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not found".to_string())
        );
        Some(Self { ffmpeg, ffprobe })
    }

    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Merge `video` and `audio` into `output`, copying the video stream and
    /// encoding audio as AAC. Inputs are removed once the merge succeeds.
    pub async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf, DownloadError> {
        info!(
            "[Muxer] Merging {} + {} -> {}",
            video.display(),
            audio.display(),
            output.display()
        );

        let args: Vec<&OsStr> = vec![
            OsStr::new("-y"),
            OsStr::new("-i"),
            video.as_os_str(),
            OsStr::new("-i"),
            audio.as_os_str(),
            OsStr::new("-c:v"),
            OsStr::new("copy"),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            OsStr::new("-map"),
            OsStr::new("0:v:0"),
            OsStr::new("-map"),
            OsStr::new("1:a:0"),
            output.as_os_str(),
        ];
        self.run_ffmpeg(&args).await?;

        for input in [video, audio] {
            if let Err(e) = tokio::fs::remove_file(input).await {
                warn!("[Muxer] Could not remove {}: {}", input.display(), e);
            }
        }
        Ok(output.to_path_buf())
    }

    /// Convert `input` to a 192 kbps stereo mp3 next to it.
    /// The source file is removed after a successful conversion.
    pub async fn to_mp3(&self, input: &Path) -> Result<PathBuf, DownloadError> {
        if input.extension().and_then(OsStr::to_str) == Some("mp3") {
            return Ok(input.to_path_buf());
        }
        let output = input.with_extension("mp3");
        info!("[Muxer] Converting {} to mp3", input.display());

        let args: Vec<&OsStr> = vec![
            OsStr::new("-y"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-vn"),
            OsStr::new("-ar"),
            OsStr::new("44100"),
            OsStr::new("-ac"),
            OsStr::new("2"),
            OsStr::new("-b:a"),
            OsStr::new("192k"),
            output.as_os_str(),
        ];
        self.run_ffmpeg(&args).await?;

        if let Err(e) = tokio::fs::remove_file(input).await {
            warn!("[Muxer] Could not remove {}: {}", input.display(), e);
        }
        Ok(output)
    }

    /// `Some(true)` if `path` has an audio stream, `None` without ffprobe
    pub async fn has_audio(&self, path: &Path) -> Result<Option<bool>, DownloadError> {
        let Some(ffprobe) = &self.ffprobe else {
            return Ok(None);
        };

        let output = TokioCommand::new(ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=codec_type",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| spawn_error(ffprobe.as_os_str(), e))?;

        if !output.status.success() {
            return Err(DownloadError::Mux(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(Some(!String::from_utf8_lossy(&output.stdout).trim().is_empty()))
    }

    async fn run_ffmpeg(&self, args: &[&OsStr]) -> Result<(), DownloadError> {
        let output = TokioCommand::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(args)
            .output()
            .await
            .map_err(|e| spawn_error(self.ffmpeg.as_os_str(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Mux(format!("ffmpeg failed: {}", stderr.trim())));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::downloader::test_support::write_script;

    /// ffmpeg stub that records its arguments and creates the output file
    fn stub_ffmpeg(dir: &Path) -> (Muxer, PathBuf) {
        let args_file = dir.join("ffmpeg-args");
        let ffmpeg = write_script(
            dir,
            "ffmpeg",
            &format!(
                "echo \"$@\" > {}\nfor a in \"$@\"; do last=\"$a\"; done\necho muxed > \"$last\"",
                args_file.display()
            ),
        );
        (Muxer::with_paths(ffmpeg, None), args_file)
    }

    #[tokio::test]
    async fn test_merge_runs_ffmpeg_and_removes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let (muxer, args_file) = stub_ffmpeg(dir.path());
        let video = dir.path().join("v.mp4");
        let audio = dir.path().join("a.m4a");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();
        let out = dir.path().join("out.mp4");

        let merged = muxer.merge(&video, &audio, &out).await.unwrap();

        assert_eq!(merged, out);
        assert!(out.exists());
        assert!(!video.exists());
        assert!(!audio.exists());
        let args = std::fs::read_to_string(args_file).unwrap();
        assert!(args.contains("-c:v copy -c:a aac -map 0:v:0 -map 1:a:0"));
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "echo 'Invalid data' >&2\nexit 1");
        let muxer = Muxer::with_paths(ffmpeg, None);
        let video = dir.path().join("v.mp4");
        let audio = dir.path().join("a.m4a");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();

        let err = muxer
            .merge(&video, &audio, &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Mux(ref m) if m.contains("Invalid data")));
        assert!(video.exists());
    }

    #[tokio::test]
    async fn test_to_mp3() {
        let dir = tempfile::tempdir().unwrap();
        let (muxer, args_file) = stub_ffmpeg(dir.path());
        let input = dir.path().join("song.m4a");
        std::fs::write(&input, b"a").unwrap();

        let out = muxer.to_mp3(&input).await.unwrap();

        assert_eq!(out, dir.path().join("song.mp3"));
        assert!(out.exists());
        assert!(!input.exists());
        let args = std::fs::read_to_string(args_file).unwrap();
        assert!(args.contains("-vn -ar 44100 -ac 2 -b:a 192k"));
    }

    #[tokio::test]
    async fn test_has_audio() {
        let dir = tempfile::tempdir().unwrap();
        let with_audio = write_script(dir.path(), "ffprobe-audio", "echo codec_type=audio");
        let silent = write_script(dir.path(), "ffprobe-silent", "exit 0");
        let file = dir.path().join("v.mp4");

        let muxer = Muxer::with_paths("ffmpeg", Some(with_audio));
        assert_eq!(muxer.has_audio(&file).await.unwrap(), Some(true));

        let muxer = Muxer::with_paths("ffmpeg", Some(silent));
        assert_eq!(muxer.has_audio(&file).await.unwrap(), Some(false));

        let muxer = Muxer::with_paths("ffmpeg", None);
        assert_eq!(muxer.has_audio(&file).await.unwrap(), None);
    }
}
