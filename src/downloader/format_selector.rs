// FormatSelector - unified format selection logic
//
// Handles:
// - Picking the stream for a requested quality (exact height, best, audio)
// - Pairing a video-only pick with the best audio track
// - Resolution listing and format grouping for --list-formats
// - yt-dlp selector strings for the yt-dlp engine
// - Codec preferences (H.264 / AAC for compatibility)

use serde::Serialize;

use super::models::{Quality, StreamFormat};

/// Selector used when the computed one matches nothing
pub const FALLBACK_SPEC: &str = "best";

/// Streams chosen for a download
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSelection<'a> {
    /// Progressive, video-only or audio-only stream
    pub primary: &'a StreamFormat,
    /// Audio to merge in when `primary` is video-only
    pub audio: Option<&'a StreamFormat>,
    /// Whether the requested quality was matched
    pub exact: bool,
}

impl StreamSelection<'_> {
    pub fn needs_merge(&self) -> bool {
        self.audio.is_some()
    }
}

/// Formats split into the three tables shown by --list-formats
#[derive(Debug, Default, Serialize)]
pub struct FormatGroups<'a> {
    pub combined: Vec<&'a StreamFormat>,
    pub video_only: Vec<&'a StreamFormat>,
    pub audio_only: Vec<&'a StreamFormat>,
}

/// Format selector with codec-aware tie breaking
pub struct FormatSelector;

impl FormatSelector {
    /// Pick the stream(s) for `quality` among directly fetchable formats.
    ///
    /// Exact height: progressive first, then any stream of that height.
    /// Otherwise the highest resolution, progressive preferred on ties.
    pub fn select(formats: &[StreamFormat], quality: Quality) -> Option<StreamSelection<'_>> {
        let direct: Vec<&StreamFormat> = formats.iter().filter(|f| f.is_direct()).collect();

        if quality == Quality::AudioOnly {
            let audio: Vec<&StreamFormat> =
                direct.iter().copied().filter(|f| f.is_audio_only()).collect();
            return Self::find_best_audio(&audio)
                .or_else(|| Self::find_highest(&direct))
                .map(|primary| StreamSelection {
                    primary,
                    audio: None,
                    exact: primary.is_audio_only(),
                });
        }

        let video: Vec<&StreamFormat> = direct.iter().copied().filter(|f| f.has_video()).collect();

        let (primary, exact) = match quality {
            Quality::Height(h) => {
                let progressive: Vec<&StreamFormat> = video
                    .iter()
                    .copied()
                    .filter(|f| f.is_progressive() && f.height == Some(h))
                    .collect();
                let any: Vec<&StreamFormat> =
                    video.iter().copied().filter(|f| f.height == Some(h)).collect();

                match Self::pick_preferred(&progressive).or_else(|| Self::pick_preferred(&any)) {
                    Some(f) => (f, true),
                    None => (Self::find_highest(&video)?, false),
                }
            }
            _ => (Self::find_highest(&video)?, true),
        };

        Some(Self::with_audio(&direct, primary, exact))
    }

    /// Stream with an explicit format id, paired with audio when video-only
    pub fn select_by_id<'a>(formats: &'a [StreamFormat], format_id: &str) -> Option<StreamSelection<'a>> {
        let direct: Vec<&StreamFormat> = formats.iter().filter(|f| f.is_direct()).collect();
        let primary = direct.iter().copied().find(|f| f.format_id == format_id)?;
        Some(Self::with_audio(&direct, primary, true))
    }

    fn with_audio<'a>(
        direct: &[&'a StreamFormat],
        primary: &'a StreamFormat,
        exact: bool,
    ) -> StreamSelection<'a> {
        let audio = if primary.is_video_only() {
            let audio: Vec<&StreamFormat> =
                direct.iter().copied().filter(|f| f.is_audio_only()).collect();
            Self::find_best_audio(&audio)
        } else {
            None
        };
        StreamSelection {
            primary,
            audio,
            exact,
        }
    }

    /// Among same-height candidates: mp4 / H.264 first, then the larger file
    fn pick_preferred<'a>(formats: &[&'a StreamFormat]) -> Option<&'a StreamFormat> {
        formats.iter().copied().max_by_key(|f| {
            (
                f.ext == "mp4",
                f.is_h264(),
                f.effective_size().unwrap_or(0),
            )
        })
    }

    /// Highest resolution; progressive wins a tie, then mp4, then bitrate
    fn find_highest<'a>(formats: &[&'a StreamFormat]) -> Option<&'a StreamFormat> {
        formats.iter().copied().max_by_key(|f| {
            (
                f.height.unwrap_or(0),
                f.is_progressive(),
                f.ext == "mp4",
                f.tbr.map(|b| (b * 100.0) as u32).unwrap_or(0),
            )
        })
    }

    /// Find best audio format (prefer AAC for compatibility)
    fn find_best_audio<'a>(formats: &[&'a StreamFormat]) -> Option<&'a StreamFormat> {
        let by_bitrate = |f: &&StreamFormat| f.abr.map(|b| (b * 100.0) as u32).unwrap_or(0);

        formats
            .iter()
            .copied()
            .filter(|f| f.is_aac())
            .max_by_key(by_bitrate)
            // Fallback to highest bitrate audio
            .or_else(|| formats.iter().copied().max_by_key(by_bitrate))
    }

    /// Progressive heights, or mp4 heights when there are no progressive
    /// streams. Deduplicated, highest first.
    pub fn available_resolutions(formats: &[StreamFormat]) -> Vec<u32> {
        let mut heights: Vec<u32> = formats
            .iter()
            .filter(|f| f.is_progressive())
            .filter_map(|f| f.height)
            .collect();

        if heights.is_empty() {
            heights = formats
                .iter()
                .filter(|f| f.has_video() && f.ext == "mp4")
                .filter_map(|f| f.height)
                .collect();
        }

        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }

    /// Split into combined / video-only / audio-only, each best first
    pub fn group(formats: &[StreamFormat]) -> FormatGroups<'_> {
        let mut groups = FormatGroups::default();
        for f in formats {
            if f.is_progressive() {
                groups.combined.push(f);
            } else if f.is_video_only() {
                groups.video_only.push(f);
            } else if f.is_audio_only() {
                groups.audio_only.push(f);
            }
        }

        let by_height = |a: &&StreamFormat, b: &&StreamFormat| {
            b.height
                .cmp(&a.height)
                .then_with(|| b.tbr.partial_cmp(&a.tbr).unwrap_or(std::cmp::Ordering::Equal))
        };
        groups.combined.sort_by(by_height);
        groups.video_only.sort_by(by_height);
        groups
            .audio_only
            .sort_by(|a, b| b.abr.partial_cmp(&a.abr).unwrap_or(std::cmp::Ordering::Equal));
        groups
    }

    /// yt-dlp `-f` selector for a quality
    ///
    /// Without ffmpeg yt-dlp cannot merge, so only single-file formats are
    /// asked for.
    pub fn format_spec(quality: Quality, ffmpeg_available: bool) -> String {
        match (quality, ffmpeg_available) {
            (Quality::AudioOnly, _) => "bestaudio/best".to_string(),
            (Quality::Height(h), true) => {
                format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")
            }
            (Quality::Height(h), false) => format!("best[height<={h}]/best"),
            (Quality::Best, true) => "bestvideo+bestaudio/best".to_string(),
            (Quality::Best, false) => FALLBACK_SPEC.to_string(),
        }
    }
}
