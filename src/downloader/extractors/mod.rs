// InfoExtractor module - video info extraction through yt-dlp
//
// Provides two modes:
// - Python mode: Uses `python3 -m yt_dlp` (pip installs, custom interpreters)
// - CLI mode: Uses native `yt-dlp` binary (faster, no Python dependency)
//
// The Orchestrator switches between modes on failure in Auto mode.

mod cli;
mod diagnostics;
mod orchestrator;
mod python;
mod traits;

pub use cli::CliInfoExtractor;
pub use diagnostics::{diagnose_error, is_benign_warning, suggestion, FailureReason, BENIGN_WARNINGS};
pub use orchestrator::{InfoExtractorOrchestrator, OrchestratorStatus};
pub use python::{python_command, PythonInfoExtractor, PYTHON_ENV};
pub use traits::{ExtractorConfig, ExtractorMode, InfoExtractor};
