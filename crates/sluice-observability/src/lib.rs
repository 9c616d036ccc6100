//! Observability infrastructure for the sluice streaming SSR bridge.
//!
//! This crate provides:
//! - `init_logging` - Global `tracing` subscriber installation
//! - `RequestMetrics` - Per-request timing summary

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

// Re-export RequestId and TimingContext from sluice-core for convenience
pub use sluice_core::{RequestId, TimingContext};
