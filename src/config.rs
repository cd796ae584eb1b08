// User settings: defaults < config file < environment < command line

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::downloader::extractors::ExtractorMode;
use crate::downloader::models::{Engine, NetworkConfig, Quality};
use crate::downloader::proxy::{ProxyConfig, ProxyKind};
use crate::downloader::retry::RetryPolicy;
use crate::downloader::DownloadError;

/// Proxy address used when neither the config file nor `-p` sets one
pub const PROXY_ENV: &str = "YTGRAB_PROXY";
pub const PROXY_TYPE_ENV: &str = "YTGRAB_PROXY_TYPE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub quality: Quality,
    pub engine: Engine,
    pub extractor: ExtractorMode,
    /// `host:port` or `scheme://host:port`
    pub proxy: Option<String>,
    pub proxy_type: ProxyKind,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub socket_timeout_secs: u32,
    pub info_timeout_secs: u32,
    pub concurrent_fragments: u32,
    pub use_aria2: bool,
    pub insecure_tls: bool,
    pub cookies_path: Option<String>,
    pub cookies_from_browser: Option<String>,
    /// YouTube player client for metadata requests (web, android, tv)
    pub player_client: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            quality: Quality::default(),
            engine: Engine::Auto,
            extractor: ExtractorMode::Auto,
            proxy: None,
            proxy_type: ProxyKind::Http,
            retries: 5,
            retry_delay_secs: 3,
            socket_timeout_secs: 15,
            info_timeout_secs: 30,
            concurrent_fragments: 8,
            use_aria2: false,
            insecure_tls: false,
            cookies_path: None,
            cookies_from_browser: None,
            player_client: None,
        }
    }
}

/// `~/Downloads` (or the platform's download folder)
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Settings {
    /// `~/.config/ytgrab/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("ytgrab").join("config.toml"))
    }

    /// Read settings from `path`. An explicit path must exist; the default
    /// path may be missing, in which case defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(proxy) = non_empty(PROXY_ENV) {
            self.proxy = Some(proxy);
        }
        if let Some(kind) = non_empty(PROXY_TYPE_ENV) {
            self.proxy_type = kind.parse().map_err(|message| ConfigError::Invalid {
                key: PROXY_TYPE_ENV,
                message,
            })?;
        }
        Ok(())
    }

    pub fn proxy_config(&self) -> Result<Option<ProxyConfig>, DownloadError> {
        self.proxy
            .as_deref()
            .map(|address| ProxyConfig::parse(address, self.proxy_type))
            .transpose()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn network_config(&self) -> Result<NetworkConfig, DownloadError> {
        Ok(NetworkConfig {
            proxy: self.proxy_config()?,
            timeout: self.socket_timeout_secs,
            insecure_tls: self.insecure_tls,
            cookies_path: self.cookies_path.clone(),
            cookies_from_browser: self.cookies_from_browser.clone(),
        })
    }
}
