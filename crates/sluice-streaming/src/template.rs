//! HTML shell template loading and splitting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OnceCell;

/// Errors raised while loading or splitting a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template marker `{0}` not found")]
    MissingMarker(String),

    #[error("Template marker must not be empty")]
    EmptyMarker,
}

/// HTML shell split at the application marker.
///
/// `head` is everything before the first marker occurrence and `tail`
/// everything after it. Both are immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    head: Bytes,
    tail: Bytes,
}

impl Template {
    /// Split `html` at the first occurrence of `marker`.
    pub fn split(html: &str, marker: &str) -> Result<Self, TemplateError> {
        if marker.is_empty() {
            return Err(TemplateError::EmptyMarker);
        }
        let (head, tail) = html
            .split_once(marker)
            .ok_or_else(|| TemplateError::MissingMarker(marker.to_string()))?;

        Ok(Self {
            head: Bytes::copy_from_slice(head.as_bytes()),
            tail: Bytes::copy_from_slice(tail.as_bytes()),
        })
    }

    /// Create directly from fragments.
    pub fn from_parts(head: impl Into<Bytes>, tail: impl Into<Bytes>) -> Self {
        Self {
            head: head.into(),
            tail: tail.into(),
        }
    }

    /// Bytes before the marker.
    pub fn head(&self) -> &Bytes {
        &self.head
    }

    /// Bytes after the marker.
    pub fn tail(&self) -> &Bytes {
        &self.tail
    }

    /// Join head, `body` and tail into a full document.
    pub fn wrap(&self, body: &str) -> String {
        let mut html = String::with_capacity(self.head.len() + body.len() + self.tail.len());
        html.push_str(&String::from_utf8_lossy(&self.head));
        html.push_str(body);
        html.push_str(&String::from_utf8_lossy(&self.tail));
        html
    }
}

/// Read a template file.
pub async fn read_template(path: &Path) -> Result<String, TemplateError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Process-wide template, loaded once and read-only afterwards.
///
/// A failed load leaves the cache empty, so the next request tries again.
#[derive(Debug)]
pub struct TemplateCache {
    path: PathBuf,
    marker: String,
    cell: OnceCell<Arc<Template>>,
}

impl TemplateCache {
    /// Create an empty cache for the template at `path`.
    pub fn new(path: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            marker: marker.into(),
            cell: OnceCell::new(),
        }
    }

    /// Get the cached template, loading it on first use.
    pub async fn get(&self) -> Result<Arc<Template>, TemplateError> {
        self.cell
            .get_or_try_init(|| async {
                let html = read_template(&self.path).await?;
                tracing::info!(path = %self.path.display(), "template loaded");
                Template::split(&html, &self.marker).map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Whether the template has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MARKER: &str = "<!--app-html-->";

    // === Splitting ===

    #[test]
    fn test_split_at_marker() {
        let template = Template::split("<html><body><!--app-html--></body></html>", MARKER).unwrap();

        assert_eq!(template.head().as_ref(), b"<html><body>");
        assert_eq!(template.tail().as_ref(), b"</body></html>");
    }

    #[test]
    fn test_split_uses_first_marker() {
        let template = Template::split("a<!--app-html-->b<!--app-html-->c", MARKER).unwrap();

        assert_eq!(template.head().as_ref(), b"a");
        assert_eq!(template.tail().as_ref(), b"b<!--app-html-->c");
    }

    #[test]
    fn test_missing_marker_is_fatal() {
        let err = Template::split("<html></html>", MARKER).unwrap_err();
        assert!(matches!(err, TemplateError::MissingMarker(m) if m == MARKER));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let err = Template::split("<html></html>", "").unwrap_err();
        assert!(matches!(err, TemplateError::EmptyMarker));
    }

    #[test]
    fn test_wrap_replaces_marker_once() {
        let source = "<html><head></head><body><div id=\"root\"><!--app-html--></div></body></html>";
        let template = Template::split(source, MARKER).unwrap();
        let html = template.wrap("<p>hi</p>");

        assert_eq!(html, source.replace(MARKER, "<p>hi</p>"));
        assert!(!html.contains(MARKER));
        assert_eq!(html.matches("<p>hi</p>").count(), 1);
    }

    #[test]
    fn test_marker_at_edges() {
        let template = Template::split("<!--app-html-->", MARKER).unwrap();
        assert!(template.head().is_empty());
        assert!(template.tail().is_empty());
    }

    // === Loading ===

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_template(Path::new("/definitely/not/here.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[tokio::test]
    async fn test_cache_loads_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<html>{}</html>", MARKER).unwrap();

        let cache = TemplateCache::new(file.path(), MARKER);
        assert!(!cache.is_loaded());

        let first = cache.get().await.unwrap();
        assert!(cache.is_loaded());

        // Later edits on disk are not observed once cached.
        std::fs::write(file.path(), "changed").unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.head().as_ref(), b"<html>");
    }

    #[tokio::test]
    async fn test_cache_retries_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        let cache = TemplateCache::new(&path, MARKER);

        assert!(cache.get().await.is_err());
        assert!(!cache.is_loaded());

        std::fs::write(&path, format!("x{}y", MARKER)).unwrap();
        let template = cache.get().await.unwrap();
        assert_eq!(template.tail().as_ref(), b"y");
    }
}
