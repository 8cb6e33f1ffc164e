//! Prometheus metrics.
//!
//! Thin wrappers over the `metrics` macros so call sites stay one line.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder (once) and return its handle.
pub fn init() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                // Another recorder is already global; keep a detached one so
                // /metrics still renders.
                warn!("Failed to install Prometheus recorder: {}", e);
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// How a cache lookup was answered: `hit`, `attach` or `miss`.
pub fn record_lookup(outcome: &'static str) {
    ::metrics::counter!("tilestash_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_origin_fetch() {
    ::metrics::counter!("tilestash_origin_fetches_total").increment(1);
}

pub fn record_origin_error() {
    ::metrics::counter!("tilestash_origin_errors_total").increment(1);
}

pub fn record_persist_error() {
    ::metrics::counter!("tilestash_persist_errors_total").increment(1);
}

pub fn record_request(status: u16) {
    ::metrics::counter!("tilestash_http_responses_total", "status" => status.to_string())
        .increment(1);
}

pub fn record_duration(start: Instant) {
    ::metrics::histogram!("tilestash_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_counters_are_rendered() {
        let handle = init();
        let _again = init();
        record_origin_fetch();
        assert!(handle.render().contains("tilestash_origin_fetches_total"));
    }

    #[test]
    fn tile_responses_are_counted_by_status() {
        let handle = init();
        record_request(404);
        let rendered = handle.render();
        assert!(rendered.contains("tilestash_http_responses_total"));
        assert!(rendered.contains("status=\"404\""));
    }
}
