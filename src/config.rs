use crate::origin::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, RetryConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Origin the keys are appended to, without trailing slash
    pub origin_url: String,
    pub is_dev: bool,
    /// Directory cache files are written to (default: system temp dir)
    pub cache_dir: PathBuf,
    /// Fixed leading part of every cache file name
    pub temp_file_prefix: String,
    /// Fixed trailing part of every cache file name
    pub cache_file_extension: String,
    /// Content-Type sent with cached payloads
    pub content_type: String,
    /// Origin fetch attempts per download (default: 1, no retry)
    pub fetch_max_attempts: u32,
    pub fetch_backoff_ms: u64,
    /// Per-attempt origin timeout; unset means no timeout
    pub fetch_timeout_ms: Option<u64>,
    /// How long shutdown waits for pending cache writes before sweeping
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, ORIGIN_URL and PORT are required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        // Origin URL: required in prod, defaults to the OSM tile server in dev
        let origin_url = if is_dev {
            env::var("ORIGIN_URL").unwrap_or_else(|_| "https://tile.openstreetmap.org".to_string())
        } else {
            env::var("ORIGIN_URL").map_err(|_| "ORIGIN_URL is required in production")?
        };
        let origin_url = validate_origin_url(&origin_url)?;

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        let temp_file_prefix =
            env::var("TEMP_FILE_PREFIX").unwrap_or_else(|_| "tile-".to_string());
        let cache_file_extension =
            env::var("CACHE_FILE_EXTENSION").unwrap_or_else(|_| ".png".to_string());
        let content_type = env::var("CONTENT_TYPE").unwrap_or_else(|_| "image/png".to_string());

        let fetch_max_attempts = env::var("FETCH_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let fetch_backoff_ms = env::var("FETCH_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BACKOFF_MS);
        let fetch_timeout_ms = env::var("FETCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok());

        let shutdown_grace_secs = env::var("SHUTDOWN_GRACE_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        Ok(Config {
            port,
            origin_url,
            is_dev,
            cache_dir,
            temp_file_prefix,
            cache_file_extension,
            content_type,
            fetch_max_attempts,
            fetch_backoff_ms,
            fetch_timeout_ms,
            shutdown_grace_secs,
        })
    }

    /// Retry policy for origin fetches
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.fetch_max_attempts,
            backoff: Duration::from_millis(self.fetch_backoff_ms),
            timeout: self.fetch_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Accept only absolute http(s) URLs; strip any trailing slash.
fn validate_origin_url(raw: &str) -> Result<String, String> {
    let parsed = Url::parse(raw).map_err(|e| format!("Invalid ORIGIN_URL {raw}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "ORIGIN_URL scheme '{scheme}' not allowed, only http/https permitted"
            ));
        }
    }
    if parsed.host().is_none() {
        return Err(format!("No host in ORIGIN_URL: {raw}"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
