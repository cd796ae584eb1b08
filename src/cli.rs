// Command-line interface

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::downloader::extractors::{ExtractorMode, InfoExtractorOrchestrator};
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{DownloadRequest, Engine, Quality, StreamFormat, VideoInfo};
use crate::downloader::proxy::{detect_local_proxies, test_proxy, ProxyConfig, ProxyKind};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::utils::format_size;
use crate::downloader::{Downloader, TerminalSink};

const PROXY_TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(version, about = "Download YouTube videos with yt-dlp and ffmpeg", long_about = None)]
pub struct Args {
    /// Video URL
    #[arg(required_unless_present_any = [
        "install", "install_ffmpeg", "install_aria2", "update", "tools", "detect_proxy", "test_proxy"
    ])]
    pub url: Option<String>,

    /// Resolution: 720, 720p, best or audio [default: 720p]
    #[arg(short = 'r', long = "resolution")]
    pub resolution: Option<Quality>,

    /// Output directory [default: ~/Downloads]
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Proxy address, host:port
    #[arg(short = 'p', long = "proxy")]
    pub proxy: Option<String>,

    /// Proxy protocol: http or socks5
    #[arg(short = 't', long = "proxy-type")]
    pub proxy_type: Option<ProxyKind>,

    /// Use the Clash Verge proxy (http://127.0.0.1:7897)
    #[arg(short = 'c', long = "clash-verge", conflicts_with = "proxy")]
    pub clash_verge: bool,

    /// List available formats and exit
    #[arg(short = 'l', long = "list-formats")]
    pub list_formats: bool,

    /// Download this exact format id (see --list-formats)
    #[arg(short = 'f', long = "format")]
    pub format: Option<String>,

    /// Download engine: auto, yt-dlp or direct
    #[arg(short = 'e', long = "engine")]
    pub engine: Option<Engine>,

    /// Attempts per engine before giving up
    #[arg(long = "retries")]
    pub retries: Option<u32>,

    /// Install or upgrade yt-dlp with pip
    #[arg(short = 'i', long = "install")]
    pub install: bool,

    /// Install ffmpeg with the system package manager
    #[arg(long = "install-ffmpeg")]
    pub install_ffmpeg: bool,

    /// Install aria2 with the system package manager
    #[arg(long = "install-aria2")]
    pub install_aria2: bool,

    /// Update yt-dlp to the latest release
    #[arg(long = "update")]
    pub update: bool,

    /// Show detected tools and versions
    #[arg(long = "tools")]
    pub tools: bool,

    /// Look for proxies listening on localhost
    #[arg(long = "detect-proxy")]
    pub detect_proxy: bool,

    /// Check that the configured proxy can reach the internet
    #[arg(long = "test-proxy")]
    pub test_proxy: bool,

    /// Skip TLS certificate verification
    #[arg(long = "insecure")]
    pub insecure: bool,

    /// Metadata extractor: auto, python or cli
    #[arg(long = "extractor")]
    pub extractor: Option<ExtractorMode>,

    /// Netscape cookies file passed to yt-dlp
    #[arg(long = "cookies", conflicts_with = "cookies_from_browser")]
    pub cookies: Option<String>,

    /// Read cookies from this browser (chrome, firefox, ...)
    #[arg(long = "cookies-from-browser")]
    pub cookies_from_browser: Option<String>,

    /// YouTube player client for metadata: web, android, tv
    #[arg(long = "player-client")]
    pub player_client: Option<String>,

    /// Let aria2c do the transfer when installed
    #[arg(long = "aria2")]
    pub aria2: bool,

    /// Config file [default: ~/.config/ytgrab/config.toml]
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Config file, then environment, then these flags
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        settings.apply_env()?;
        self.apply_to(&mut settings);
        Ok(settings)
    }

    fn apply_to(&self, settings: &mut Settings) {
        if let Some(quality) = self.resolution {
            settings.quality = quality;
        }
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        if self.clash_verge {
            let preset = ProxyConfig::clash_verge();
            settings.proxy = Some(format!("{}:{}", preset.host, preset.port));
            settings.proxy_type = preset.kind;
        } else if let Some(proxy) = &self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(kind) = self.proxy_type {
            settings.proxy_type = kind;
        }
        if let Some(engine) = self.engine {
            settings.engine = engine;
        }
        if let Some(extractor) = self.extractor {
            settings.extractor = extractor;
        }
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if self.insecure {
            settings.insecure_tls = true;
        }
        if self.aria2 {
            settings.use_aria2 = true;
        }
        if let Some(client) = &self.player_client {
            settings.player_client = Some(client.clone());
        }
        if let Some(path) = &self.cookies {
            settings.cookies_path = Some(path.clone());
            settings.cookies_from_browser = None;
        }
        if let Some(browser) = &self.cookies_from_browser {
            settings.cookies_from_browser = Some(browser.clone());
            settings.cookies_path = None;
        }
    }

    /// Whether downloads go through a proxy, for error advice
    pub fn uses_proxy(&self) -> bool {
        self.clash_verge
            || self.proxy.is_some()
            || std::env::var(crate::config::PROXY_ENV).map_or(false, |v| !v.trim().is_empty())
    }

    fn is_install_mode(&self) -> bool {
        self.install || self.install_ffmpeg || self.install_aria2 || self.update
    }
}

pub async fn run(args: Args) -> Result<()> {
    let settings = args.settings()?;
    let tools = ToolManager::new();

    if args.install {
        println!("Installing yt-dlp...");
        tools.install(ToolType::YtDlp).await?;
    }
    if args.update {
        println!("Updating yt-dlp...");
        tools.update(ToolType::YtDlp).await?;
    }
    if args.install_ffmpeg {
        println!("Installing ffmpeg...");
        tools.install(ToolType::Ffmpeg).await?;
    }
    if args.install_aria2 {
        println!("Installing aria2...");
        tools.install(ToolType::Aria2).await?;
    }
    if args.tools {
        print_tools(&tools);
    }
    if args.detect_proxy {
        detect_proxies().await;
    }
    if args.test_proxy {
        let proxy = settings.proxy_config()?.unwrap_or_else(ProxyConfig::clash_verge);
        println!("Testing proxy {} ...", proxy);
        test_proxy(&proxy, PROXY_TEST_TIMEOUT)
            .await
            .with_context(|| format!("Proxy {} cannot reach the internet", proxy))?;
        println!("Proxy {} works", proxy);
    }

    let Some(url) = args.url.clone() else {
        return Ok(());
    };

    if !args.is_install_mode() {
        ensure_ytdlp(&tools).await?;
    }

    let network = settings.network_config()?;
    if let Some(proxy) = &network.proxy {
        info!("Using proxy {}", proxy);
    }
    let downloader = Downloader::from_settings(&settings);

    if args.list_formats {
        let info = downloader.get_video_info(&url, &network).await?;
        print_formats(&info);
        return Ok(());
    }

    let mut request = DownloadRequest::new(url, settings.quality, settings.output_dir.clone());
    request.format_id = args.format.clone();
    request.network = network;

    println!(
        "Downloading {} ({}) to {} [{}]",
        request.url,
        request
            .format_id
            .as_deref()
            .map(|id| format!("format {}", id))
            .unwrap_or_else(|| request.quality.to_string()),
        request.output_dir.display(),
        downloader.backend_names().join(" -> ")
    );

    let sink = TerminalSink::new();
    let outcome = downloader.download(&request, &sink).await?;
    println!("Saved: {}", outcome.path.display());
    Ok(())
}

/// Install yt-dlp once if neither the binary nor the Python module exists
async fn ensure_ytdlp(tools: &ToolManager) -> Result<()> {
    if tools.is_installed(ToolType::YtDlp) || tools.is_installed(ToolType::YtDlpModule) {
        return Ok(());
    }

    warn!("yt-dlp not found, trying to install it");
    println!("yt-dlp is not installed. Installing it now...");
    tools
        .install(ToolType::YtDlp)
        .await
        .context("yt-dlp is missing and automatic installation failed; run with --install or install it manually")?;

    if !tools.is_installed(ToolType::YtDlp) && !tools.is_installed(ToolType::YtDlpModule) {
        bail!("yt-dlp was installed but cannot be found; make sure pip's bin directory is on PATH");
    }
    Ok(())
}

fn print_tools(tools: &ToolManager) {
    println!("{:<18} {:<14} PATH", "TOOL", "VERSION");
    for tool in tools.get_all_tools() {
        println!(
            "{:<18} {:<14} {}",
            tool.name,
            tool.version.as_deref().unwrap_or("-"),
            tool.path.as_deref().unwrap_or("not found")
        );
    }

    let status = InfoExtractorOrchestrator::new().get_status();
    println!(
        "\nMetadata extractors: python module {}, yt-dlp binary {} (auto uses {})",
        if status.python_available { "yes" } else { "no" },
        if status.cli_available { "yes" } else { "no" },
        status.recommended_mode
    );
}

async fn detect_proxies() {
    println!("Scanning local proxy ports...");
    let found = detect_local_proxies().await;
    if found.is_empty() {
        println!("No local proxy found");
        return;
    }
    for proxy in found {
        let status = match test_proxy(&proxy, PROXY_TEST_TIMEOUT).await {
            Ok(()) => "working".to_string(),
            Err(e) => format!("not working ({})", e.kind()),
        };
        println!("  {:<28} {}", proxy.url(), status);
    }
}

fn format_row(f: &StreamFormat) -> String {
    format!(
        "{:<8} {:<5} {:<11} {:>4} {:<14} {:<12} {:>10}  {}",
        f.format_id,
        f.ext,
        f.resolution_label(),
        f.fps.map(|fps| format!("{:.0}", fps)).unwrap_or_default(),
        f.vcodec.as_deref().unwrap_or("-"),
        f.acodec.as_deref().unwrap_or("-"),
        f.effective_size().map(format_size).unwrap_or_else(|| "-".to_string()),
        f.format_note.as_deref().unwrap_or("")
    )
}

fn print_formats(info: &VideoInfo) {
    println!("{}", info.title);
    println!("Uploader: {}  Duration: {}", info.uploader, info.duration_label());

    let groups = FormatSelector::group(&info.formats);
    let header = format!(
        "{:<8} {:<5} {:<11} {:>4} {:<14} {:<12} {:>10}  NOTE",
        "ID", "EXT", "RESOLUTION", "FPS", "VCODEC", "ACODEC", "SIZE"
    );
    for (title, formats) in [
        ("Video + audio", &groups.combined),
        ("Video only", &groups.video_only),
        ("Audio only", &groups.audio_only),
    ] {
        if formats.is_empty() {
            continue;
        }
        println!("\n{}:", title);
        println!("{}", header);
        for f in formats.iter() {
            println!("{}", format_row(f));
        }
    }

    let resolutions: Vec<String> = FormatSelector::available_resolutions(&info.formats)
        .iter()
        .map(|h| format!("{}p", h))
        .collect();
    if !resolutions.is_empty() {
        println!("\nAvailable resolutions: {}", resolutions.join(", "));
    }
}
