//! Static files served from a directory on disk.

use std::io;
use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use mime_guess::Mime;

/// Cache policy for hashed production assets.
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
/// Cache policy for development modules.
pub const NO_CACHE: &str = "no-cache";

/// A file read from disk, ready to send.
#[derive(Debug, Clone)]
pub struct Asset {
    pub contents: Bytes,
    pub mime: Mime,
    pub cache_control: &'static str,
}

impl Asset {
    /// Override the cache policy.
    pub fn with_cache_control(mut self, value: &'static str) -> Self {
        self.cache_control = value;
        self
    }
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        let len = self.contents.len();
        let mut response = Response::new(Body::from(self.contents));
        *response.status_mut() = StatusCode::OK;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(self.mime.as_ref()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
            headers.insert(header::CONTENT_LENGTH, value);
        }
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(self.cache_control),
        );

        response
    }
}

/// Load `request_path` relative to `root`.
///
/// Returns `Ok(None)` for anything that is not a plain file below `root`:
/// traversal attempts, directories, and missing files.
pub async fn load_asset(root: &Path, request_path: &str) -> io::Result<Option<Asset>> {
    let candidate = request_path.trim_start_matches('/');
    if candidate.is_empty()
        || candidate.ends_with('/')
        || candidate.split('/').any(|segment| segment == ".." || segment.contains('\\'))
    {
        return Ok(None);
    }

    let path = root.join(candidate);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    }

    let contents = tokio::fs::read(&path).await?;
    Ok(Some(Asset {
        contents: Bytes::from(contents),
        mime: mime_guess::from_path(&path).first_or_octet_stream(),
        cache_control: IMMUTABLE,
    }))
}
