//! Development-mode bundler seam.
//!
//! In development the shell template is re-read on every request and handed
//! to a [`DevBundler`], which may rewrite it (client script injection) and
//! also owns module requests and the renderer.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use sluice_streaming::Renderer;

use crate::assets::{load_asset, NO_CACHE};

/// Failure inside the dev bundler.
#[derive(Debug, thiserror::Error)]
pub enum DevError {
    #[error("Failed to load module {path}: {source}")]
    Module {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to transform index.html: {0}")]
    Transform(String),

    #[error("Failed to load renderer: {0}")]
    Renderer(String),
}

/// Development server hooks.
#[async_trait]
pub trait DevBundler: Send + Sync + 'static {
    /// Rewrite the raw `index.html` before it is split.
    async fn transform_index_html(&self, url: &str, html: String) -> Result<String, DevError>;

    /// Fetch the current renderer.
    async fn load_renderer(&self) -> Result<Arc<dyn Renderer>, DevError>;

    /// Serve a module or asset request. `Ok(None)` falls through to SSR.
    async fn serve_module(&self, path: &str) -> Result<Option<Response>, DevError>;

    /// Whether `path` is a module request rather than a page.
    fn handles(&self, path: &str) -> bool {
        is_module_path(path)
    }
}

/// Module paths: `/src/...`, `/@...`, or anything with a dot.
pub fn is_module_path(path: &str) -> bool {
    path.starts_with("/src/") || path.starts_with("/@") || path.contains('.')
}

/// Bundler that serves project files from disk as-is.
///
/// Module paths it receives are relative to the base path; the injected
/// client script is prefixed with it.
pub struct FsDevBundler {
    root: PathBuf,
    base: String,
    client_script: Option<String>,
    renderer: Arc<dyn Renderer>,
}

impl FsDevBundler {
    pub fn new(root: impl Into<PathBuf>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            root: root.into(),
            base: "/".to_string(),
            client_script: None,
            renderer,
        }
    }

    /// Base path the app is mounted under.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Inject `<script type="module" src=...>` into every shell.
    pub fn with_client_script(mut self, src: Option<String>) -> Self {
        self.client_script = src;
        self
    }
}

#[async_trait]
impl DevBundler for FsDevBundler {
    async fn transform_index_html(&self, _url: &str, html: String) -> Result<String, DevError> {
        let Some(src) = &self.client_script else {
            return Ok(html);
        };
        Ok(inject_head_script(&html, &prefix_base(&self.base, src)))
    }

    async fn load_renderer(&self) -> Result<Arc<dyn Renderer>, DevError> {
        Ok(Arc::clone(&self.renderer))
    }

    async fn serve_module(&self, path: &str) -> Result<Option<Response>, DevError> {
        let asset = load_asset(&self.root, path)
            .await
            .map_err(|source| DevError::Module {
                path: path.to_string(),
                source,
            })?;

        Ok(asset.map(|asset| asset.with_cache_control(NO_CACHE).into_response()))
    }
}

/// Mount an absolute `path` under `base`. Other URLs are left alone.
fn prefix_base(base: &str, path: &str) -> String {
    match path.strip_prefix('/') {
        Some(rest) if !path.starts_with("//") => {
            format!("{}/{}", base.trim_end_matches('/'), rest)
        }
        _ => path.to_string(),
    }
}

/// Insert a module script before `</head>`, or at the start when there is none.
fn inject_head_script(html: &str, src: &str) -> String {
    let tag = format!(r#"<script type="module" src="{}"></script>"#, src);
    match html.find("</head>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..idx]);
            out.push_str(&tag);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{}{}", tag, html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_streaming::RenderSink;

    struct Noop;

    #[async_trait]
    impl Renderer for Noop {
        async fn render(&self, _url: String, _sink: RenderSink) {}
    }

    fn bundler(root: &std::path::Path) -> FsDevBundler {
        FsDevBundler::new(root, Arc::new(Noop))
    }

    #[test]
    fn test_module_paths() {
        assert!(is_module_path("/src/main.tsx"));
        assert!(is_module_path("/@vite/client"));
        assert!(is_module_path("/favicon.ico"));
        assert!(!is_module_path("/"));
        assert!(!is_module_path("/about"));
    }

    #[tokio::test]
    async fn test_injects_client_script() {
        let dir = tempfile::tempdir().unwrap();
        let dev = bundler(dir.path()).with_client_script(Some("/@vite/client".into()));

        let html = dev
            .transform_index_html("/", "<html><head></head><body><!--app-html--></body></html>".into())
            .await
            .unwrap();
        assert_eq!(
            html,
            r#"<html><head><script type="module" src="/@vite/client"></script></head><body><!--app-html--></body></html>"#
        );
    }

    #[tokio::test]
    async fn test_client_script_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let dev = bundler(dir.path())
            .with_base("/app/")
            .with_client_script(Some("/@vite/client".into()));

        let html = dev
            .transform_index_html("/app/", "<head></head>".into())
            .await
            .unwrap();
        assert_eq!(
            html,
            r#"<head><script type="module" src="/app/@vite/client"></script></head>"#
        );
    }

    #[test]
    fn test_prefix_base() {
        assert_eq!(prefix_base("/", "/@vite/client"), "/@vite/client");
        assert_eq!(prefix_base("/app/", "/src/main.ts"), "/app/src/main.ts");
        assert_eq!(prefix_base("/app/", "https://cdn.test/x.js"), "https://cdn.test/x.js");
        assert_eq!(prefix_base("/app/", "//cdn.test/x.js"), "//cdn.test/x.js");
    }

    #[tokio::test]
    async fn test_no_script_leaves_html() {
        let dir = tempfile::tempdir().unwrap();
        let html = bundler(dir.path())
            .transform_index_html("/", "<p>x</p>".into())
            .await
            .unwrap();
        assert_eq!(html, "<p>x</p>");
    }

    #[tokio::test]
    async fn test_serve_module_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.css"), "h1{}").unwrap();
        let dev = bundler(dir.path());

        let response = dev.serve_module("/src/app.css").await.unwrap().unwrap();
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert!(dev.serve_module("/src/missing.css").await.unwrap().is_none());
    }
}
