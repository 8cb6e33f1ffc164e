//! Error types for the cache core and its HTTP front end.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::error;

/// Failure of an origin fetch.
///
/// Cloneable so one outcome can be handed to every caller attached to the
/// same in-flight download.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("origin request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("origin returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("download of {0} was abandoned before it completed")]
    Cancelled(String),
}

/// Failure while writing or reading a cache file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create cache file in {}: {source}", dir.display())]
    Create {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("blocking file task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid tile key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::Fetch(FetchError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
            ProxyError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
