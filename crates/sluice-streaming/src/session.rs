//! Render lifecycle state machine.

use http::StatusCode;

use crate::render::RenderError;

/// Lifecycle state of a single render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, render not started.
    Idle,
    /// Render running, shell not ready yet.
    ShellPending,
    /// Headers sent, body streaming.
    Streaming,
    /// Shell failed or never arrived; fallback page instead of a stream.
    Errored,
    /// Response finished.
    Done,
}

/// Event driving a session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    ShellReady,
    ShellError,
    Error,
    Timeout,
    Complete,
}

/// Transition not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid render session transition: {event:?} in state {from:?}")]
pub struct SessionError {
    pub from: SessionState,
    pub event: SessionEvent,
}

/// What the caller must do after the abort timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Shell never became ready: abort and answer with the fallback page.
    AbortBeforeShell,
    /// Already streaming: abort and close the stream with what was sent.
    AbortStream,
}

/// Render session: request lifecycle plus the error flag.
#[derive(Debug)]
pub struct RenderSession {
    state: SessionState,
    did_error: bool,
    errors: Vec<String>,
}

impl RenderSession {
    /// Create an idle session.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            did_error: false,
            errors: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether any error has been recorded.
    pub fn did_error(&self) -> bool {
        self.did_error
    }

    /// Recorded error messages, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Rendering started.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.transition(
            SessionEvent::Start,
            &[SessionState::Idle],
            SessionState::ShellPending,
        )
    }

    /// Shell ready. Returns the status to send, reflecting the error flag now.
    pub fn on_shell_ready(&mut self) -> Result<StatusCode, SessionError> {
        self.transition(
            SessionEvent::ShellReady,
            &[SessionState::ShellPending],
            SessionState::Streaming,
        )?;
        Ok(if self.did_error {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        })
    }

    /// Shell failed to render.
    pub fn on_shell_error(&mut self, error: &RenderError) -> Result<(), SessionError> {
        self.transition(
            SessionEvent::ShellError,
            &[SessionState::ShellPending],
            SessionState::Errored,
        )?;
        self.record(error.message());
        Ok(())
    }

    /// Non-fatal render error. Sets the error flag; state unchanged.
    pub fn on_error(&mut self, error: &RenderError) -> Result<(), SessionError> {
        match self.state {
            SessionState::ShellPending | SessionState::Streaming => {
                self.record(error.message());
                Ok(())
            }
            from => Err(SessionError {
                from,
                event: SessionEvent::Error,
            }),
        }
    }

    /// Abort timer fired. Only valid once per session.
    pub fn on_timeout(&mut self) -> Result<TimeoutAction, SessionError> {
        match self.state {
            SessionState::ShellPending => {
                self.state = SessionState::Errored;
                self.record("render aborted before shell was ready");
                Ok(TimeoutAction::AbortBeforeShell)
            }
            SessionState::Streaming => {
                self.state = SessionState::Done;
                self.record("render aborted while streaming");
                Ok(TimeoutAction::AbortStream)
            }
            from => Err(SessionError {
                from,
                event: SessionEvent::Timeout,
            }),
        }
    }

    /// Response finished.
    pub fn on_complete(&mut self) -> Result<(), SessionError> {
        self.transition(
            SessionEvent::Complete,
            &[SessionState::Streaming],
            SessionState::Done,
        )
    }

    /// Whether the session reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Errored | SessionState::Done)
    }

    fn record(&mut self, message: &str) {
        self.did_error = true;
        self.errors.push(message.to_string());
    }

    fn transition(
        &mut self,
        event: SessionEvent,
        allowed: &[SessionState],
        to: SessionState,
    ) -> Result<(), SessionError> {
        if !allowed.contains(&self.state) {
            return Err(SessionError {
                from: self.state,
                event,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new()
    }
}
