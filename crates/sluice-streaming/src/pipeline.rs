//! SSR pipeline: render events in, backpressured response body out.
//!
//! The shell phase is awaited before anything is committed, so a shell
//! failure can still turn into a clean 500. Once the shell is ready the body
//! is a pull-based stream: the HTTP layer polls it only when the socket can
//! take more, which in turn is the only thing draining the renderer channel.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::StatusCode;
use sluice_core::{LifecyclePhase, TimingContext};

use crate::abort::AbortTimer;
use crate::render::{RenderError, RenderEvent, RenderHandle};
use crate::session::{RenderSession, TimeoutAction};
use crate::template::Template;
use crate::transform::{SentinelTransform, Step};

/// Response body produced by the pipeline.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Callback receiving the summary once the body finished or was dropped.
pub type FinishHook = Box<dyn FnOnce(StreamSummary) + Send>;

/// Why the fallback page is served instead of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The renderer reported a shell error.
    ShellError(RenderError),
    /// The shell was not ready before the abort delay.
    Timeout(Duration),
    /// The renderer stopped before its shell was ready.
    RenderEnded,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShellError(err) => write!(f, "shell error: {}", err),
            Self::Timeout(delay) => write!(f, "shell not ready within {:?}", delay),
            Self::RenderEnded => write!(f, "render ended before shell was ready"),
        }
    }
}

/// Result of the shell phase.
pub enum PipelineOutcome {
    /// Shell ready: send `status` with `text/html` and stream `body`.
    Stream { status: StatusCode, body: BodyStream },
    /// Shell failed: send the fallback page with status 500.
    Fallback { reason: FallbackReason, aborted: bool },
}

impl fmt::Debug for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream { status, .. } => f
                .debug_struct("Stream")
                .field("status", status)
                .finish_non_exhaustive(),
            Self::Fallback { reason, aborted } => f
                .debug_struct("Fallback")
                .field("reason", reason)
                .field("aborted", aborted)
                .finish(),
        }
    }
}

/// How a streamed response ended.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Status sent with the headers.
    pub status: StatusCode,
    /// Body bytes yielded, head and tail included.
    pub bytes_sent: usize,
    /// Whether any render error was recorded.
    pub did_error: bool,
    /// Whether the abort timer cancelled the render.
    pub aborted: bool,
    /// Whether the end-of-render sentinel was seen.
    pub sentinel_seen: bool,
    /// Whether the body was dropped before it finished.
    pub client_disconnected: bool,
    /// Final lifecycle phase.
    pub phase: LifecyclePhase,
    /// Timing marks for the request.
    pub timing: TimingContext,
}

/// Reports the summary exactly once, including when the body is dropped.
struct SummaryGuard {
    summary: StreamSummary,
    hook: Option<FinishHook>,
}

impl SummaryGuard {
    fn finish(mut self) {
        self.summary.timing.mark_complete();
        if let Some(hook) = self.hook.take() {
            hook(self.summary.clone());
        }
    }
}

impl Drop for SummaryGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            self.summary.client_disconnected = true;
            self.summary.phase = LifecyclePhase::Error("client disconnected".to_string());
            hook(self.summary.clone());
        }
    }
}

/// Chunks held before shell-ready unless configured otherwise.
pub const DEFAULT_PENDING_LIMIT: usize = 16;

/// Bridge between one render and one HTTP response.
pub struct SsrPipeline {
    template: Arc<Template>,
    sentinel: Bytes,
    abort_delay: Duration,
    pending_limit: usize,
    timing: TimingContext,
    on_finish: Option<FinishHook>,
}

impl SsrPipeline {
    /// Create a pipeline for `template`.
    pub fn new(
        template: Arc<Template>,
        sentinel: impl Into<Bytes>,
        abort_delay: Duration,
    ) -> Self {
        Self {
            template,
            sentinel: sentinel.into(),
            abort_delay,
            pending_limit: DEFAULT_PENDING_LIMIT,
            timing: TimingContext::new(),
            on_finish: None,
        }
    }

    /// Hold at most `limit` chunks while the shell is pending.
    ///
    /// Once full, the renderer channel is no longer drained, so a renderer
    /// writing ahead of its shell suspends until the abort timer fires. A
    /// renderer must report its shell within `limit` chunks.
    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit.max(1);
        self
    }

    /// Use the request's timing context.
    pub fn with_timing(mut self, timing: TimingContext) -> Self {
        self.timing = timing;
        self
    }

    /// Register a callback for the end of the body.
    pub fn on_finish(mut self, hook: impl FnOnce(StreamSummary) + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    /// Drive `handle` through the shell phase.
    pub async fn run(self, mut handle: RenderHandle) -> PipelineOutcome {
        let Self {
            template,
            sentinel,
            abort_delay,
            pending_limit,
            mut timing,
            on_finish,
        } = self;

        let mut session = RenderSession::new();
        let mut timer = AbortTimer::arm(abort_delay);
        let mut pending: VecDeque<Bytes> = VecDeque::new();
        if let Err(err) = session.start() {
            tracing::error!(error = %err, "render session refused to start");
        }

        let status = loop {
            tokio::select! {
                biased;
                event = handle.next_event(), if pending.len() < pending_limit => match event {
                    Some(RenderEvent::Chunk(bytes)) => pending.push_back(bytes),
                    Some(RenderEvent::Error(err)) => {
                        tracing::error!(error = %err, "render error before shell");
                        record(&mut session, &err);
                    }
                    Some(RenderEvent::ShellReady) => match session.on_shell_ready() {
                        Ok(status) => break status,
                        Err(err) => tracing::warn!(error = %err, "ignoring shell ready"),
                    },
                    Some(RenderEvent::ShellError(err)) => {
                        tracing::error!(error = %err, "shell error");
                        if let Err(e) = session.on_shell_error(&err) {
                            tracing::warn!(error = %e, "unexpected shell error event");
                        }
                        let aborted = handle.abort();
                        return PipelineOutcome::Fallback {
                            reason: FallbackReason::ShellError(err),
                            aborted,
                        };
                    }
                    None => {
                        tracing::error!("render ended before shell was ready");
                        return PipelineOutcome::Fallback {
                            reason: FallbackReason::RenderEnded,
                            aborted: false,
                        };
                    }
                },
                _ = &mut timer => {
                    if let Err(err) = session.on_timeout() {
                        tracing::warn!(error = %err, "unexpected timeout");
                    }
                    let aborted = handle.abort();
                    tracing::error!(
                        delay_ms = abort_delay.as_millis() as u64,
                        "shell not ready, render aborted"
                    );
                    return PipelineOutcome::Fallback {
                        reason: FallbackReason::Timeout(abort_delay),
                        aborted,
                    };
                }
            }
        };

        timing.mark_shell_ready();
        tracing::debug!(status = status.as_u16(), "shell ready, streaming started");

        let guard = SummaryGuard {
            summary: StreamSummary {
                status,
                bytes_sent: 0,
                did_error: session.did_error(),
                aborted: false,
                sentinel_seen: false,
                client_disconnected: false,
                phase: LifecyclePhase::ShellSent,
                timing,
            },
            hook: on_finish,
        };

        let head = template.head().clone();
        let mut transform = SentinelTransform::new(sentinel, template.tail().clone());

        let body = async_stream::stream! {
            let mut guard = guard;
            let mut aborted = false;

            guard.summary.bytes_sent += head.len();
            yield Ok(head);

            loop {
                let event = match pending.pop_front() {
                    Some(bytes) => Some(RenderEvent::Chunk(bytes)),
                    None => tokio::select! {
                        biased;
                        event = handle.next_event() => event,
                        _ = &mut timer => {
                            match session.on_timeout() {
                                Ok(TimeoutAction::AbortStream) => {
                                    aborted = handle.abort();
                                    tracing::error!(
                                        delay_ms = abort_delay.as_millis() as u64,
                                        "render aborted while streaming"
                                    );
                                }
                                Ok(TimeoutAction::AbortBeforeShell) | Err(_) => {}
                            }
                            break;
                        }
                    },
                };

                match event {
                    Some(RenderEvent::Chunk(bytes)) => match transform.push(&bytes) {
                        Ok(Step::Forward(out)) => {
                            if out.is_empty() {
                                continue;
                            }
                            guard.summary.timing.mark_first_chunk();
                            guard.summary.bytes_sent += out.len();
                            yield Ok(out);
                        }
                        Ok(Step::Complete { output, discarded }) => {
                            if discarded > 0 {
                                tracing::error!(
                                    discarded,
                                    "content after end-of-render sentinel dropped"
                                );
                                record(&mut session, &RenderError::new("content after sentinel"));
                            }
                            timer.disarm();
                            guard.summary.sentinel_seen = true;
                            guard.summary.timing.mark_first_chunk();
                            guard.summary.bytes_sent += output.len();
                            yield Ok(output);
                            break;
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "transform rejected chunk");
                            break;
                        }
                    },
                    Some(RenderEvent::Error(err)) => {
                        tracing::error!(error = %err, "render error while streaming");
                        record(&mut session, &err);
                    }
                    Some(RenderEvent::ShellError(err)) => {
                        tracing::error!(error = %err, "shell error after shell was ready");
                        record(&mut session, &err);
                    }
                    Some(RenderEvent::ShellReady) => {
                        tracing::warn!("duplicate shell ready ignored");
                    }
                    None => break,
                }
            }

            timer.disarm();
            // Stop the renderer; nothing after the sentinel is forwarded.
            handle.abort();

            if let Some(rest) = transform.finish() {
                if !aborted {
                    tracing::warn!("render stream ended without sentinel, tail appended");
                }
                guard.summary.bytes_sent += rest.len();
                yield Ok(rest);
            }

            if session.on_complete().is_err() && !aborted {
                tracing::debug!(state = ?session.state(), "session already finished");
            }
            guard.summary.did_error = session.did_error();
            guard.summary.aborted = aborted;
            guard.summary.phase = if aborted {
                LifecyclePhase::Aborted
            } else {
                LifecyclePhase::Completion
            };
            guard.finish();
        };

        PipelineOutcome::Stream {
            status,
            body: Box::pin(body),
        }
    }
}

fn record(session: &mut RenderSession, err: &RenderError) {
    if let Err(e) = session.on_error(err) {
        tracing::warn!(error = %e, "render error outside an active session");
    }
}
