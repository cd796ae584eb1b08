//! ytgrab: download YouTube videos through yt-dlp and ffmpeg, with proxy
//! support and linear-backoff retry.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod logging;
