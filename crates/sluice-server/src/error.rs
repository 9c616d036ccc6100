//! Server errors and the plain-text fallback response.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sluice_core::ConfigError;
use sluice_streaming::TemplateError;

use crate::dev::DevError;

/// Body used when no configured fallback is at hand.
pub const DEFAULT_ERROR_BODY: &str = "Server Error";

/// Errors raised while serving a request or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Dev bundler error: {0}")]
    Dev(#[from] DevError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error_response(DEFAULT_ERROR_BODY)
    }
}

/// Plain-text 500 response carrying `body`.
pub fn error_response(body: &str) -> Response {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
