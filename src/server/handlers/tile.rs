use crate::{
    error::{ProxyError, Result},
    server::state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::debug;

/// Serve a tile from the cache, fetching it from origin on first request
pub async fn serve_tile(
    Path((x, y, z)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    debug!("Have request: {}; {}; {}", x, y, z);

    let key = tile_key(&x, &y, &z)?;
    let result = state.cache.get_file(&key).await;

    crate::metrics::record_duration(start);
    match result {
        Ok(bytes) => {
            crate::metrics::record_request(200);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, state.config.content_type.as_str())],
                Body::from(bytes),
            )
                .into_response())
        }
        Err(e) => {
            let response = e.into_response();
            crate::metrics::record_request(response.status().as_u16());
            Ok(response)
        }
    }
}

/// Build the cache key `/x/y/z`, rejecting segments that could escape the
/// origin path.
pub fn tile_key(x: &str, y: &str, z: &str) -> Result<String> {
    for segment in [x, y, z] {
        let valid = !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(ProxyError::InvalidKey(segment.to_string()));
        }
    }
    Ok(format!("/{}/{}/{}", x, y, z))
}
