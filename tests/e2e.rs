//! End-to-end tests for the tilestash caching proxy
//!
//! Starts a real Axum server on a random port in front of a wiremock origin
//! and drives it over HTTP.

use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tilestash::cache::CacheStatus;
use tilestash::config::Config;
use tilestash::server::{router, state::AppState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

// ── Test server helpers ───────────────────────────────────────────────────────

/// Spin up the proxy in front of `origin_url`, returning its address and state.
async fn start_server(origin_url: &str, cache_dir: &TempDir) -> (SocketAddr, AppState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();

    let config = Config {
        port: 0,
        origin_url: origin_url.to_string(),
        is_dev: true,
        cache_dir: cache_dir.path().to_path_buf(),
        temp_file_prefix: "tile-".to_string(),
        cache_file_extension: ".png".to_string(),
        content_type: "image/png".to_string(),
        fetch_max_attempts: 1,
        fetch_backoff_ms: 1,
        fetch_timeout_ms: None,
        shutdown_grace_secs: 1,
    };

    let state = AppState::new(config);
    let app = router(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Origin that answers `tile_path` with `body` after a short delay.
async fn slow_origin(tile_path: &str, body: &[u8], expected_hits: u64) -> MockServer {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(tile_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(expected_hits)
        .mount(&origin)
        .await;
    origin
}

async fn wait_until_saved(state: &AppState, key: &str) {
    for _ in 0..400 {
        if state.cache.index().status(key) == Some(CacheStatus::Saved) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} was never saved", key);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_requests_coalesce_then_read_from_disk() {
    let origin = slow_origin("/1/2/3", &PNG_MAGIC, 1).await;
    let dir = TempDir::new().unwrap();
    let (addr, state) = start_server(&origin.uri(), &dir).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/1/2/3", addr);

    let requests = (0..5).map(|_| {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move { client.get(&url).send().await.unwrap() })
    });
    let responses: Vec<_> = futures_util::future::join_all(requests).await;

    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
        assert_eq!(&response.bytes().await.unwrap()[..], &PNG_MAGIC);
    }

    wait_until_saved(&state, "/1/2/3").await;

    let sixth = client.get(&url).send().await.unwrap();
    assert_eq!(sixth.status(), 200);
    assert_eq!(&sixth.bytes().await.unwrap()[..], &PNG_MAGIC);

    // Dropping `origin` verifies it saw exactly one request.
}

#[tokio::test]
async fn failed_origin_fetch_is_retried_on_next_request() {
    let origin = MockServer::start().await;
    // 503 once (highest priority), then the 200 fallback
    Mock::given(method("GET"))
        .and(path("/4/5/6"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/4/5/6"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .mount(&origin)
        .await;

    let dir = TempDir::new().unwrap();
    let (addr, _state) = start_server(&origin.uri(), &dir).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/4/5/6", addr);

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 502);

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text().await.unwrap(), "second");
    assert_eq!(origin.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn shutdown_removes_cache_files() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tile".to_vec()))
        .mount(&origin)
        .await;

    let dir = TempDir::new().unwrap();
    let (addr, state) = start_server(&origin.uri(), &dir).await;
    let client = reqwest::Client::new();

    for key in ["/1/1/1", "/2/2/2"] {
        let resp = client
            .get(format!("http://{}{}", addr, key))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let report = state.cache.shutdown(Duration::from_secs(5)).await;
    assert_eq!(report.deleted, 2);

    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}
