// Proxy configuration, probing and local detection
//
// A proxy is an immutable value: every retry attempt builds a fresh HTTP
// client (or a fresh yt-dlp process) from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::errors::DownloadError;

/// Ports local proxy clients (Clash, V2Ray, Squid, Tor, ...) usually listen on
pub const COMMON_HTTP_PORTS: [u16; 8] = [7897, 1080, 8080, 7890, 10809, 8118, 3128, 8000];
pub const COMMON_SOCKS5_PORTS: [u16; 6] = [7897, 1080, 10808, 7891, 1081, 9050];

pub const DEFAULT_SOCKS5_PORT: u16 = 1080;

/// Reachability probe target
pub const PROBE_URL: &str = "https://www.google.com";

/// Supported proxy protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Http,
    Socks5,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Http => write!(f, "http"),
            ProxyKind::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" | "https" => Ok(ProxyKind::Http),
            "socks5" | "socks5h" | "socks" => Ok(ProxyKind::Socks5),
            other => Err(format!(
                "unsupported proxy type '{}', expected http or socks5",
                other
            )),
        }
    }
}

/// A single proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn new(kind: ProxyKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }

    /// Clash Verge's default mixed port
    pub fn clash_verge() -> Self {
        Self::new(ProxyKind::Http, "127.0.0.1", 7897)
    }

    /// Parse `host:port` or `scheme://host:port`.
    ///
    /// A scheme in the address wins over `kind`. SOCKS5 without a port
    /// falls back to 1080; HTTP requires one.
    pub fn parse(address: &str, kind: ProxyKind) -> Result<Self, DownloadError> {
        let address = address.trim();
        let (kind, rest) = match address.split_once("://") {
            Some((scheme, rest)) => (
                scheme.parse::<ProxyKind>().map_err(DownloadError::InvalidUrl)?,
                rest,
            ),
            None => (kind, address),
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    DownloadError::InvalidUrl(format!("invalid proxy port '{}'", port))
                })?;
                (host, port)
            }
            None if kind == ProxyKind::Socks5 => (rest, DEFAULT_SOCKS5_PORT),
            None => {
                return Err(DownloadError::InvalidUrl(format!(
                    "proxy address '{}' needs a port (host:port)",
                    address
                )))
            }
        };

        if host.is_empty() {
            return Err(DownloadError::InvalidUrl(format!(
                "proxy address '{}' has no host",
                address
            )));
        }

        Ok(Self::new(kind, host, port))
    }

    /// Proxy URL understood by both yt-dlp and reqwest.
    /// SOCKS5 uses `socks5h` so host names resolve on the proxy side.
    pub fn url(&self) -> String {
        match self.kind {
            ProxyKind::Http => format!("http://{}:{}", self.host, self.port),
            ProxyKind::Socks5 => format!("socks5h://{}:{}", self.host, self.port),
        }
    }

    pub fn reqwest_proxy(&self) -> Result<reqwest::Proxy, DownloadError> {
        reqwest::Proxy::all(self.url())
            .map_err(|e| DownloadError::InvalidUrl(format!("invalid proxy {}: {}", self, e)))
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Send one request through the proxy to check it can reach the internet
pub async fn test_proxy(proxy: &ProxyConfig, limit: Duration) -> Result<(), DownloadError> {
    info!("[Proxy] Testing {} against {}", proxy, PROBE_URL);

    let client = reqwest::Client::builder()
        .proxy(proxy.reqwest_proxy()?)
        .danger_accept_invalid_certs(true)
        .timeout(limit)
        .build()
        .map_err(|e| DownloadError::Network(format!("failed to build HTTP client: {}", e)))?;

    let response = client.get(PROBE_URL).send().await?;
    debug!("[Proxy] Probe answered with HTTP {}", response.status());
    Ok(())
}

/// Probe 127.0.0.1 on the common proxy ports
pub async fn detect_local_proxies() -> Vec<ProxyConfig> {
    detect_proxies_on("127.0.0.1", &COMMON_HTTP_PORTS, &COMMON_SOCKS5_PORTS).await
}

/// TCP-connect probe; a listening port counts as a candidate proxy
pub async fn detect_proxies_on(
    host: &str,
    http_ports: &[u16],
    socks5_ports: &[u16],
) -> Vec<ProxyConfig> {
    let mut found = Vec::new();

    let candidates = http_ports
        .iter()
        .map(|p| (ProxyKind::Http, *p))
        .chain(socks5_ports.iter().map(|p| (ProxyKind::Socks5, *p)));

    for (kind, port) in candidates {
        if port_is_open(host, port).await {
            debug!("[ProxyDetect] {} port {} is open", kind, port);
            found.push(ProxyConfig::new(kind, host, port));
        }
    }

    if found.is_empty() {
        debug!("[ProxyDetect] No local proxy detected");
    }
    found
}

async fn port_is_open(host: &str, port: u16) -> bool {
    matches!(
        timeout(
            Duration::from_millis(200),
            TcpStream::connect((host, port))
        )
        .await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let p = ProxyConfig::parse("127.0.0.1:7890", ProxyKind::Http).unwrap();
        assert_eq!(p, ProxyConfig::new(ProxyKind::Http, "127.0.0.1", 7890));
        assert_eq!(p.url(), "http://127.0.0.1:7890");
    }

    #[test]
    fn test_parse_scheme_overrides_kind() {
        let p = ProxyConfig::parse("socks5://proxy.local:9050", ProxyKind::Http).unwrap();
        assert_eq!(p.kind, ProxyKind::Socks5);
        assert_eq!(p.url(), "socks5h://proxy.local:9050");
    }

    #[test]
    fn test_socks5_default_port() {
        let p = ProxyConfig::parse("10.0.0.2", ProxyKind::Socks5).unwrap();
        assert_eq!(p.port, DEFAULT_SOCKS5_PORT);
        assert!(ProxyConfig::parse("10.0.0.2", ProxyKind::Http).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ProxyConfig::parse("127.0.0.1:notaport", ProxyKind::Http).is_err());
        assert!(ProxyConfig::parse(":8080", ProxyKind::Http).is_err());
        assert!(ProxyConfig::parse("ftp://h:1", ProxyKind::Http).is_err());
    }

    #[test]
    fn test_clash_verge_preset() {
        assert_eq!(ProxyConfig::clash_verge().url(), "http://127.0.0.1:7897");
    }

    #[test]
    fn test_reqwest_proxy_builds() {
        assert!(ProxyConfig::new(ProxyKind::Socks5, "127.0.0.1", 1080)
            .reqwest_proxy()
            .is_ok());
    }

    #[tokio::test]
    async fn test_detects_listening_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let found = detect_proxies_on("127.0.0.1", &[port], &[]).await;
        assert_eq!(found, vec![ProxyConfig::new(ProxyKind::Http, "127.0.0.1", port)]);
    }

    #[tokio::test]
    async fn test_closed_port_not_reported() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(detect_proxies_on("127.0.0.1", &[], &[port]).await.is_empty());
    }
}
