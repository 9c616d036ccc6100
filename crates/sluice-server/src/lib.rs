//! HTTP surface for the sluice streaming SSR bridge.
//!
//! A single catch-all route under the configured base path renders every
//! page through `sluice_streaming::SsrPipeline`. Production adds a static
//! asset route with compression; development routes module requests to a
//! `DevBundler` and reloads the template on every request.

mod app;
mod assets;
mod dev;
mod error;
mod ssr;
mod state;

pub use app::*;
pub use assets::{load_asset, Asset};
pub use dev::*;
pub use error::*;
pub use ssr::render_page;
pub use state::*;
