//! Core abstractions for the sluice streaming SSR bridge.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `ServerConfig` / `Mode` - Server configuration and environment overlay
//! - `RequestContext` - Per-request identity and timing
//! - `LifecyclePhase` - Request lifecycle tracking

mod config;
mod context;
mod lifecycle;

pub use config::*;
pub use context::*;
pub use lifecycle::*;
