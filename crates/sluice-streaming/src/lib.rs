//! Streaming primitives for shell-first SSR.
//!
//! This crate bridges an external rendering engine's chunked output to an
//! HTTP response body:
//! - `Template` / `TemplateCache` - HTML shell loading and splitting
//! - `Renderer` / `RenderSink` / `RenderHandle` - Render invocation contract
//! - `SentinelTransform` - Chunk filter that re-attaches the template tail
//! - `RenderSession` - Explicit render lifecycle state machine
//! - `AbortTimer` - Cancels renders whose shell never becomes ready
//! - `SsrPipeline` - Wires all of the above into a backpressured body stream

mod abort;
mod pipeline;
mod render;
mod session;
mod template;
mod transform;

pub use abort::*;
pub use pipeline::*;
pub use render::*;
pub use session::*;
pub use template::*;
pub use transform::*;
