//! Reference renderer demonstrating shell-first streaming.
//!
//! This workload shows:
//! - A data loader that runs before the shell is ready
//! - A suspended card streamed after the shell, replacing its fallback
//! - The end-of-render sentinel closing the output
//!
//! Pages: `/` (home with loader data and the card) and `/about`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::DEFAULT_SENTINEL;
use sluice_streaming::{RenderSink, Renderer, SinkClosed};

/// Route matched from a request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    About,
    NotFound,
}

impl Page {
    /// Match `url` after stripping `base` and any query string.
    pub fn route(url: &str, base: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let prefix = base.trim_end_matches('/');
        let path = path.strip_prefix(prefix).unwrap_or(path);

        match path.trim_end_matches('/') {
            "" => Self::Home,
            "/about" => Self::About,
            _ => Self::NotFound,
        }
    }
}

/// Demo renderer.
#[derive(Debug, Clone)]
pub struct HelloRenderer {
    base: String,
    sentinel: String,
    loader_delay: Duration,
    card_delay: Duration,
}

impl HelloRenderer {
    pub fn new() -> Self {
        Self {
            base: "/".to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            loader_delay: Duration::from_millis(100),
            card_delay: Duration::from_millis(1500),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Time the home loader takes before the shell can render.
    pub fn with_loader_delay(mut self, delay: Duration) -> Self {
        self.loader_delay = delay;
        self
    }

    /// Time the suspended card takes after the shell.
    pub fn with_card_delay(mut self, delay: Duration) -> Self {
        self.card_delay = delay;
        self
    }

    async fn render_home(&self, sink: &RenderSink) -> Result<(), SinkClosed> {
        tokio::time::sleep(self.loader_delay).await;
        let loaded_at = Utc::now().to_rfc3339();

        sink.shell_ready().await?;
        sink.write(format!(
            r#"<main><h1>Sluice + Streaming SSR</h1>{nav}<div class="loader-data"><h3>Loader Data:</h3><p>Data loaded from loader!</p><p>Loaded at: {loaded_at}</p></div>"#,
            nav = self.nav(),
            loaded_at = escape_html(&loaded_at),
        ))
        .await?;
        sink.write(r#"<div id="card-slot"><p>Loading card component...</p></div>"#)
            .await?;
        sink.write(r#"<p class="read-the-docs">Rendered on the server, streamed in order.</p></main>"#)
            .await?;

        tokio::time::sleep(self.card_delay).await;
        tracing::debug!("card resolved");
        sink.write(concat!(
            r#"<div hidden id="card-resolved"><div class="card"><h2>Card</h2><p>Streamed after the shell.</p></div></div>"#,
            r#"<script>(function(){var s=document.getElementById("card-slot"),r=document.getElementById("card-resolved");if(s&&r){s.replaceChildren(...r.childNodes);r.remove();}})()</script>"#,
        ))
        .await
    }

    async fn render_about(&self, sink: &RenderSink) -> Result<(), SinkClosed> {
        sink.shell_ready().await?;
        sink.write(format!(
            "<main><h1>About Page</h1><p>This page is rendered by a streaming renderer.</p>{}</main>",
            self.nav()
        ))
        .await
    }

    async fn render_not_found(&self, url: &str, sink: &RenderSink) -> Result<(), SinkClosed> {
        sink.shell_ready().await?;
        sink.write(format!(
            "<main><h1>Not Found</h1><p>No page matches <code>{}</code>.</p>{}</main>",
            escape_html(url),
            self.nav()
        ))
        .await
    }

    fn nav(&self) -> String {
        let root = if self.base.ends_with('/') {
            self.base.clone()
        } else {
            format!("{}/", self.base)
        };
        format!(
            r#"<nav><a href="{root}">Home</a> <a href="{root}about">About</a></nav>"#,
            root = escape_html(&root)
        )
    }
}

impl Default for HelloRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for HelloRenderer {
    async fn render(&self, url: String, sink: RenderSink) {
        let page = Page::route(&url, &self.base);
        tracing::debug!(%url, ?page, "rendering");

        let result = match page {
            Page::Home => self.render_home(&sink).await,
            Page::About => self.render_about(&sink).await,
            Page::NotFound => self.render_not_found(&url, &sink).await,
        };

        if result.is_ok() && sink.write(self.sentinel.clone()).await.is_ok() {
            return;
        }
        tracing::debug!(%url, "response closed before render finished");
    }
}

/// HTML escape to prevent XSS.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sluice_streaming::{start_render, RenderEvent};

    use super::*;

    async fn collect(renderer: HelloRenderer, url: &str) -> (Vec<RenderEvent>, String) {
        let mut handle = start_render(Arc::new(renderer), url, 8);
        let mut events = Vec::new();
        let mut html = String::new();
        while let Some(event) = handle.next_event().await {
            if let RenderEvent::Chunk(chunk) = &event {
                html.push_str(std::str::from_utf8(chunk).unwrap());
            }
            events.push(event);
        }
        (events, html)
    }

    fn fast() -> HelloRenderer {
        HelloRenderer::new()
            .with_loader_delay(Duration::ZERO)
            .with_card_delay(Duration::ZERO)
    }

    // === Routing Tests ===

    #[test]
    fn test_routes() {
        assert_eq!(Page::route("/", "/"), Page::Home);
        assert_eq!(Page::route("/?tab=1", "/"), Page::Home);
        assert_eq!(Page::route("/about", "/"), Page::About);
        assert_eq!(Page::route("/about/", "/"), Page::About);
        assert_eq!(Page::route("/missing", "/"), Page::NotFound);
    }

    #[test]
    fn test_routes_under_base() {
        assert_eq!(Page::route("/app/", "/app/"), Page::Home);
        assert_eq!(Page::route("/app", "/app/"), Page::Home);
        assert_eq!(Page::route("/app/about", "/app/"), Page::About);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
    }

    // === Render Tests ===

    #[tokio::test]
    async fn test_about_page() {
        let (events, html) = collect(fast(), "/about").await;

        assert!(matches!(events[0], RenderEvent::ShellReady));
        assert!(html.contains("<h1>About Page</h1>"));
        assert!(html.ends_with(DEFAULT_SENTINEL));
    }

    #[tokio::test]
    async fn test_home_streams_card_after_fallback() {
        let (events, html) = collect(fast(), "/").await;

        assert!(matches!(events[0], RenderEvent::ShellReady));
        let fallback = html.find("Loading card component...").unwrap();
        let card = html.find("Streamed after the shell.").unwrap();
        assert!(fallback < card);
        assert_eq!(html.matches(DEFAULT_SENTINEL).count(), 1);
        assert!(html.ends_with(DEFAULT_SENTINEL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_delays_shell() {
        let renderer = HelloRenderer::new()
            .with_loader_delay(Duration::from_millis(100))
            .with_card_delay(Duration::from_secs(5));
        let mut handle = start_render(Arc::new(renderer), "/", 8);

        let start = tokio::time::Instant::now();
        assert!(matches!(handle.next_event().await, Some(RenderEvent::ShellReady)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_not_found_escapes_url() {
        let (_, html) = collect(fast(), "/<script>").await;
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<code><script>"));
    }

    #[tokio::test]
    async fn test_custom_sentinel_and_base() {
        let renderer = fast().with_base("/app/").with_sentinel("<end>");
        let (_, html) = collect(renderer, "/app/about").await;

        assert!(html.contains(r#"<a href="/app/about">About</a>"#));
        assert!(html.ends_with("<end>"));
    }
}
