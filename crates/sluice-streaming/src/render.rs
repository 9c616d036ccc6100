//! Render invocation contract.
//!
//! A `Renderer` is the external rendering engine. It receives the request URL
//! and a `RenderSink` carrying the lifecycle callbacks plus the output pipe.
//! `start_render` runs it on the tokio runtime and hands back a
//! `RenderHandle` for consuming events and aborting.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{AbortHandle, Abortable, FutureExt};
use tokio::sync::mpsc;

/// Error reported by a renderer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    /// Create a render error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for RenderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RenderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// The consumer stopped reading; the renderer should stop producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Render output closed by the consumer")]
pub struct SinkClosed;

/// Event emitted by a renderer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// The shell rendered; streaming may begin.
    ShellReady,
    /// The shell failed to render.
    ShellError(RenderError),
    /// A non-fatal error in deferred content.
    Error(RenderError),
    /// A chunk of rendered HTML.
    Chunk(Bytes),
}

/// Callback set and output pipe handed to a renderer.
///
/// Every call goes through a bounded channel, so `write` suspends while the
/// client is slower than the renderer.
#[derive(Debug, Clone)]
pub struct RenderSink {
    tx: mpsc::Sender<RenderEvent>,
}

impl RenderSink {
    /// Signal that the shell is ready.
    pub async fn shell_ready(&self) -> Result<(), SinkClosed> {
        self.send(RenderEvent::ShellReady).await
    }

    /// Signal that the shell failed to render.
    pub async fn shell_error(&self, error: impl Into<RenderError>) -> Result<(), SinkClosed> {
        self.send(RenderEvent::ShellError(error.into())).await
    }

    /// Report an error in content rendered after the shell.
    pub async fn error(&self, error: impl Into<RenderError>) -> Result<(), SinkClosed> {
        self.send(RenderEvent::Error(error.into())).await
    }

    /// Write a chunk of HTML. Waits for channel capacity.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), SinkClosed> {
        self.send(RenderEvent::Chunk(chunk.into())).await
    }

    async fn send(&self, event: RenderEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// External rendering engine.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    /// Render `url`, reporting lifecycle events and output through `sink`.
    ///
    /// Returning drops the sink, which ends the event stream.
    async fn render(&self, url: String, sink: RenderSink);
}

/// Handle to a running render.
#[derive(Debug)]
pub struct RenderHandle {
    events: mpsc::Receiver<RenderEvent>,
    abort: AbortHandle,
    aborted: bool,
}

impl RenderHandle {
    /// Next event, or `None` once the renderer finished or was aborted.
    pub async fn next_event(&mut self) -> Option<RenderEvent> {
        self.events.recv().await
    }

    /// Cancel rendering. Returns `true` only for the call that aborted.
    pub fn abort(&mut self) -> bool {
        if self.aborted {
            return false;
        }
        self.aborted = true;
        self.abort.abort();
        true
    }

    /// Whether `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        // Consumer gone: nothing will read further output.
        self.abort.abort();
    }
}

/// Start rendering `url` on the current tokio runtime.
///
/// At most `capacity` events are buffered between renderer and consumer.
pub fn start_render(
    renderer: Arc<dyn Renderer>,
    url: impl Into<String>,
    capacity: usize,
) -> RenderHandle {
    let (tx, events) = mpsc::channel(capacity.max(1));
    let (abort, registration) = AbortHandle::new_pair();
    let url = url.into();

    let task = Abortable::new(
        AssertUnwindSafe(async move { renderer.render(url, RenderSink { tx }).await })
            .catch_unwind(),
        registration,
    );

    tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("renderer panicked"),
            Err(_) => tracing::debug!("render aborted"),
        }
    });

    RenderHandle {
        events,
        abort,
        aborted: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct Scripted(Vec<RenderEvent>);

    #[async_trait]
    impl Renderer for Scripted {
        async fn render(&self, _url: String, sink: RenderSink) {
            for event in self.0.clone() {
                if sink.send(event).await.is_err() {
                    return;
                }
            }
        }
    }

    struct Endless {
        written: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Renderer for Endless {
        async fn render(&self, _url: String, sink: RenderSink) {
            loop {
                if sink.write("x").await.is_err() {
                    self.stopped.store(true, Ordering::SeqCst);
                    return;
                }
                self.written.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Panics;

    #[async_trait]
    impl Renderer for Panics {
        async fn render(&self, _url: String, _sink: RenderSink) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let renderer = Arc::new(Scripted(vec![
            RenderEvent::ShellReady,
            RenderEvent::Chunk(Bytes::from_static(b"<p>")),
            RenderEvent::Error(RenderError::new("late")),
        ]));
        let mut handle = start_render(renderer, "/", 4);

        assert_eq!(handle.next_event().await, Some(RenderEvent::ShellReady));
        assert_eq!(
            handle.next_event().await,
            Some(RenderEvent::Chunk(Bytes::from_static(b"<p>")))
        );
        assert_eq!(
            handle.next_event().await,
            Some(RenderEvent::Error(RenderError::new("late")))
        );
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_bounded_channel_applies_backpressure() {
        let written = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(Endless {
            written: written.clone(),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        let _handle = start_render(renderer, "/", 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Nothing is reading, so the renderer stalls once the channel is full.
        assert_eq!(written.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abort_stops_renderer_once() {
        let renderer = Arc::new(Endless {
            written: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        let mut handle = start_render(renderer, "/", 1);

        assert!(handle.abort());
        assert!(!handle.abort());
        assert!(handle.is_aborted());

        // Drain what was buffered; the stream then ends.
        let mut drained = 0;
        while handle.next_event().await.is_some() {
            drained += 1;
            assert!(drained <= 2);
        }
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_renderer() {
        let written = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(Endless {
            written: written.clone(),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        let handle = start_render(renderer, "/", 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = written.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(written.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_panicking_renderer_ends_stream() {
        let mut handle = start_render(Arc::new(Panics), "/", 1);
        assert_eq!(handle.next_event().await, None);
    }

    #[test]
    fn test_render_error_conversions() {
        let err: RenderError = "shell failed".into();
        assert_eq!(err.message(), "shell failed");
        assert_eq!(err.to_string(), "shell failed");
    }
}
