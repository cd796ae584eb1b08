// Downloader backends

pub mod direct;
pub mod ytdlp;

pub use direct::DirectBackend;
pub use ytdlp::YtDlpBackend;
