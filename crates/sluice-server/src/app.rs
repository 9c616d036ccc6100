//! Router assembly and the server loop.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use sluice_core::{RequestId, ServerConfig};
use sluice_streaming::Renderer;
use tower_http::compression::CompressionLayer;
use tracing::Instrument;

use crate::assets::load_asset;
use crate::error::{error_response, ServerError};
use crate::ssr::render_page;
use crate::state::AppState;

/// Response header echoing the request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Build the router for `state`.
///
/// Every request goes through the SSR handler unless a mode-specific layer
/// answers first: the dev bundler for module paths, or the static asset
/// directory in production.
pub fn build_router(state: AppState) -> Router {
    let config = state.config();
    let production = config.mode.is_production();
    let compress = production && config.compression;

    let mut router = Router::new().fallback(render_page);

    router = if production {
        router.layer(middleware::from_fn_with_state(state.clone(), static_assets))
    } else {
        router.layer(middleware::from_fn_with_state(state.clone(), dev_modules))
    };

    router = router
        .layer(middleware::from_fn_with_state(state.clone(), base_prefix))
        .layer(middleware::from_fn(request_span));

    if compress {
        router = router.layer(CompressionLayer::new().gzip(true).deflate(true));
    }

    router.with_state(state)
}

/// Validate `config`, then bind and serve until Ctrl-C.
pub async fn serve(config: ServerConfig, renderer: Arc<dyn Renderer>) -> Result<(), ServerError> {
    let config = config.validate()?;
    serve_state(AppState::new(config, renderer)).await
}

/// Bind and serve a prepared state until Ctrl-C.
pub async fn serve_state(state: AppState) -> Result<(), ServerError> {
    let addr = state.config().bind_addr();
    let mode = state.config().mode;
    let base = state.config().base.clone();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!(%addr, %mode, %base, "Server is running on port {}", state.config().port);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Attach a request ID and wrap the request in a tracing span.
async fn request_span(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(RequestId::from_string)
        .unwrap_or_else(RequestId::generate);
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Only paths under the configured base are served.
async fn base_prefix(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if strip_base(request.uri().path(), &state.config().base).is_none() {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Production: answer from the built client directory when a file matches.
async fn static_assets(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let config = state.config();
    let Some(relative) = strip_base(request.uri().path(), &config.base).map(str::to_string) else {
        return next.run(request).await;
    };
    if is_shell_path(&relative) {
        return next.run(request).await;
    }

    match load_asset(&config.static_dir, &relative).await {
        Ok(Some(asset)) => asset.into_response(),
        Ok(None) => next.run(request).await,
        Err(err) => {
            tracing::error!(error = %err, path = %relative, "failed to read static asset");
            error_response(&config.error_body)
        }
    }
}

/// Development: hand module requests to the dev bundler.
async fn dev_modules(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(bundler) = state.dev_bundler() else {
        return next.run(request).await;
    };
    let Some(path) = strip_base(request.uri().path(), &state.config().base).map(str::to_string)
    else {
        return next.run(request).await;
    };
    if !bundler.handles(&path) {
        return next.run(request).await;
    }

    match bundler.serve_module(&path).await {
        Ok(Some(response)) => response,
        Ok(None) => next.run(request).await,
        Err(err) => {
            tracing::error!(error = %err, path = %path, "dev bundler failed");
            error_response(&state.config().error_body)
        }
    }
}

/// Path relative to `base` (with a leading `/`), or `None` outside it.
fn strip_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base == "/" {
        return Some(path);
    }
    let trimmed = base.trim_end_matches('/');
    match path.strip_prefix(trimmed) {
        Some("") => Some("/"),
        Some(rest) if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// The SSR shell must never be sent raw.
fn is_shell_path(relative: &str) -> bool {
    relative == "/" || relative.ends_with("/index.html") || relative == "index.html"
}
