use crate::{
    cache::{CacheService, DiskStore},
    config::Config,
    origin::HttpOriginFetcher,
};
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Tile cache in front of the origin
    pub cache: CacheService,
    /// Prometheus render handle for /metrics
    pub metrics: PrometheusHandle,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Self {
        let http_client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create HTTP client");

        let fetcher = HttpOriginFetcher::new(
            http_client,
            config.origin_url.clone(),
            config.retry_config(),
        );
        let store = DiskStore::new(
            config.cache_dir.clone(),
            config.temp_file_prefix.clone(),
            config.cache_file_extension.clone(),
        );

        Self {
            config: Arc::new(config),
            cache: CacheService::new(store, Arc::new(fetcher)),
            metrics: crate::metrics::init(),
            started_at: Instant::now(),
        }
    }
}
