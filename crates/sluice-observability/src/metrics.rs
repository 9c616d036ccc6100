//! Per-request timing metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::{LifecyclePhase, RequestId, TimingContext};

/// Metrics for a single SSR request, emitted once when it ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Request path.
    pub route: String,
    /// Wall-clock time the request started.
    pub started_at: DateTime<Utc>,
    /// HTTP status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Time to shell ready (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_shell_us: Option<u64>,
    /// Time to first rendered chunk (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_chunk_us: Option<u64>,
    /// Total request duration (microseconds).
    pub total_duration_us: u64,
    /// Body bytes sent.
    pub bytes_sent: usize,
    /// Whether a render error was recorded.
    pub did_error: bool,
    /// Final lifecycle phase label.
    pub outcome: String,
}

impl RequestMetrics {
    /// Build metrics from a request's timing context.
    pub fn new(request_id: &RequestId, route: impl Into<String>, timing: &TimingContext) -> Self {
        let total = timing.total_time();
        let elapsed = chrono::Duration::from_std(timing.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let started_at = Utc::now() - elapsed;

        Self {
            request_id: request_id.to_string(),
            route: route.into(),
            started_at,
            status_code: None,
            time_to_shell_us: timing.time_to_shell().map(|d| d.as_micros() as u64),
            time_to_first_chunk_us: timing.time_to_first_chunk().map(|d| d.as_micros() as u64),
            total_duration_us: total.as_micros() as u64,
            bytes_sent: 0,
            did_error: false,
            outcome: LifecyclePhase::Start.label().to_string(),
        }
    }

    /// Set the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Set the number of body bytes sent.
    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes_sent = bytes;
        self
    }

    /// Set the error flag.
    pub fn with_error(mut self, did_error: bool) -> Self {
        self.did_error = did_error;
        self
    }

    /// Set the final phase.
    pub fn with_phase(mut self, phase: &LifecyclePhase) -> Self {
        self.outcome = phase.label().to_string();
        self
    }

    /// Emit as a single structured event.
    pub fn emit(&self) {
        let total_ms = self.total_duration_us as f64 / 1000.0;
        if self.did_error {
            tracing::warn!(
                request_id = %self.request_id,
                route = %self.route,
                status = self.status_code,
                time_to_shell_us = self.time_to_shell_us,
                total_ms,
                bytes = self.bytes_sent,
                outcome = %self.outcome,
                "request finished with errors"
            );
        } else {
            tracing::info!(
                request_id = %self.request_id,
                route = %self.route,
                status = self.status_code,
                time_to_shell_us = self.time_to_shell_us,
                total_ms,
                bytes = self.bytes_sent,
                outcome = %self.outcome,
                "request finished"
            );
        }
    }
}
