//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Request received, render started.
    Start,
    /// Shell is ready; headers and the template head have been committed.
    ShellSent,
    /// Tail appended, response finished.
    Completion,
    /// Render aborted by the abort timer.
    Aborted,
    /// An error occurred.
    Error(String),
}

impl LifecyclePhase {
    /// Stable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ShellSent => "shell_sent",
            Self::Completion => "completion",
            Self::Aborted => "aborted",
            Self::Error(_) => "error",
        }
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark. The first mark for a name wins.
    pub fn mark(&mut self, name: &str) {
        self.marks
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    /// Record that the shell became ready.
    pub fn mark_shell_ready(&mut self) {
        self.mark("shell_ready");
    }

    /// Record that the first rendered chunk went out.
    pub fn mark_first_chunk(&mut self) {
        self.mark("first_chunk");
    }

    /// Record that the response completed.
    pub fn mark_complete(&mut self) {
        self.mark("complete");
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time from start to a named mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get time to shell ready.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start("shell_ready")
    }

    /// Get time to first rendered chunk.
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.since_start("first_chunk")
    }

    /// Get total request time; falls back to elapsed time when not complete.
    pub fn total_time(&self) -> Duration {
        self.since_start("complete").unwrap_or_else(|| self.elapsed())
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
