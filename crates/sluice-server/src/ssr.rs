//! Catch-all SSR handler.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use sluice_core::{RequestContext, RequestId};
use sluice_observability::RequestMetrics;
use sluice_streaming::{start_render, PipelineOutcome, SsrPipeline};

use crate::error::{error_response, ServerError};
use crate::state::AppState;

/// Render the requested page as a streamed HTML document.
pub async fn render_page(State(state): State<AppState>, request: Request) -> Response {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let mut ctx = RequestContext::new(request.method().clone(), url);
    if let Some(id) = request.extensions().get::<RequestId>() {
        ctx = ctx.with_request_id(id.clone());
    }

    match stream_page(&state, &ctx).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, path = %ctx.path, "SSR error");
            RequestMetrics::new(&ctx.request_id, ctx.path.as_str(), &ctx.timing)
                .with_status(500)
                .with_error(true)
                .emit();
            error_response(&state.config().error_body)
        }
    }
}

async fn stream_page(state: &AppState, ctx: &RequestContext) -> Result<Response, ServerError> {
    let config = state.config();
    let template = state.template(&ctx.url).await?;
    let renderer = state.renderer().await?;

    let handle = start_render(renderer, ctx.url.clone(), config.channel_capacity);

    let request_id = ctx.request_id.clone();
    let route = ctx.path.clone();
    let pipeline = SsrPipeline::new(template, config.sentinel.clone(), config.abort_delay())
        .with_pending_limit(config.channel_capacity)
        .with_timing(ctx.timing.clone())
        .on_finish(move |summary| {
            RequestMetrics::new(&request_id, route, &summary.timing)
                .with_status(summary.status.as_u16())
                .with_bytes(summary.bytes_sent)
                .with_error(summary.did_error)
                .with_phase(&summary.phase)
                .emit();
        });

    match pipeline.run(handle).await {
        PipelineOutcome::Stream { status, body } => {
            tracing::info!(path = %ctx.path, status = status.as_u16(), "shell ready, streaming");
            let mut response = Response::new(Body::from_stream(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            Ok(response)
        }
        PipelineOutcome::Fallback { reason, aborted } => {
            tracing::error!(path = %ctx.path, %reason, aborted, "shell failed");
            RequestMetrics::new(&ctx.request_id, ctx.path.as_str(), &ctx.timing)
                .with_status(500)
                .with_error(true)
                .emit();
            Ok(error_response(&config.error_body))
        }
    }
}
