// Service configuration from flags and environment variables

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::service::MAX_TTL;
use crate::downloader::ProviderSpec;

#[derive(Debug, Clone, Parser)]
#[command(name = "track-downloader", version, about = "Track download REST API with provider fallback")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Public base URL used in download links; derived from the request when unset
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Default lifetime of a download link (e.g. "2h", "30m")
    #[arg(long = "ttl", env = "DOWNLOAD_TTL", default_value = "2h", value_parser = parse_ttl)]
    pub download_ttl: Duration,

    /// How often expired downloads are swept
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "1m", value_parser = parse_positive_duration)]
    pub cleanup_interval: Duration,

    /// Limit for a single provider attempt; unlimited when unset
    #[arg(long, env = "PROVIDER_TIMEOUT", value_parser = parse_positive_duration)]
    pub provider_timeout: Option<Duration>,

    /// Directory that holds per-request work areas
    #[arg(long, env = "WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Metadata lookup URL template ({id}, {url})
    #[arg(long, env = "METADATA_URL", default_value = "http://127.0.0.1:8090/v1/tracks/{id}")]
    pub metadata_url: String,

    /// Provider definitions, `name=cmd:<program>` or `name=http[-ext]:<url template>`
    #[arg(
        long = "provider",
        env = "PROVIDERS",
        value_delimiter = ',',
        default_values = [
            "tidal=cmd:spotiflac-tidal",
            "qobuz=cmd:spotiflac-qobuz",
            "amazon=cmd:spotiflac-amazon",
        ]
    )]
    pub providers: Vec<ProviderSpec>,

    /// Service order used when a request does not name any
    #[arg(
        long = "default-services",
        env = "DEFAULT_SERVICES",
        value_delimiter = ',',
        default_values = ["tidal", "qobuz", "amazon"]
    )]
    pub default_services: Vec<String>,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("track-downloader"))
                .unwrap_or_else(|| std::env::temp_dir().join("track-downloader"))
        })
    }

    /// Configured base URL without trailing slashes
    pub fn public_base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
    }
}

fn parse_positive_duration(raw: &str) -> Result<Duration, String> {
    let parsed = humantime::parse_duration(raw.trim()).map_err(|e| format!("invalid duration {:?}: {}", raw, e))?;
    if parsed.is_zero() {
        return Err(format!("invalid duration {:?}: must be > 0", raw));
    }
    Ok(parsed)
}

/// Default link lifetime, bounded like per-request TTLs
fn parse_ttl(raw: &str) -> Result<Duration, String> {
    let parsed = parse_positive_duration(raw)?;
    if parsed > MAX_TTL {
        return Err(format!(
            "invalid duration {:?}: must be at most {}",
            raw,
            humantime::format_duration(MAX_TTL)
        ));
    }
    Ok(parsed)
}
