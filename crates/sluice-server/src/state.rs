//! Shared application state.

use std::sync::Arc;

use sluice_core::ServerConfig;
use sluice_streaming::{read_template, Renderer, Template, TemplateCache};

use crate::dev::{DevBundler, FsDevBundler};
use crate::error::ServerError;

/// Where shells and renderers come from for each request.
#[derive(Clone)]
enum Source {
    /// Built template loaded once, fixed renderer.
    Production {
        templates: Arc<TemplateCache>,
        renderer: Arc<dyn Renderer>,
    },
    /// Template re-read and renderer fetched per request.
    Development { bundler: Arc<dyn DevBundler> },
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    source: Source,
}

impl AppState {
    /// State for `config.mode`, using [`FsDevBundler`] in development.
    pub fn new(config: ServerConfig, renderer: Arc<dyn Renderer>) -> Self {
        if config.mode.is_production() {
            Self::production(config, renderer)
        } else {
            let bundler = FsDevBundler::new(config.project_root.clone(), renderer)
                .with_base(config.base.clone())
                .with_client_script(config.dev_client_script.clone());
            Self::development(config, Arc::new(bundler))
        }
    }

    pub fn production(config: ServerConfig, renderer: Arc<dyn Renderer>) -> Self {
        let templates = TemplateCache::new(
            config.dist_template_path.clone(),
            config.placeholder.clone(),
        );
        Self {
            config: Arc::new(config),
            source: Source::Production {
                templates: Arc::new(templates),
                renderer,
            },
        }
    }

    pub fn development(config: ServerConfig, bundler: Arc<dyn DevBundler>) -> Self {
        Self {
            config: Arc::new(config),
            source: Source::Development { bundler },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Dev bundler, when running in development.
    pub fn dev_bundler(&self) -> Option<&Arc<dyn DevBundler>> {
        match &self.source {
            Source::Development { bundler } => Some(bundler),
            Source::Production { .. } => None,
        }
    }

    /// Split shell for a request to `url`.
    pub async fn template(&self, url: &str) -> Result<Arc<Template>, ServerError> {
        match &self.source {
            Source::Production { templates, .. } => Ok(templates.get().await?),
            Source::Development { bundler } => {
                let html = read_template(&self.config.template_path).await?;
                let html = bundler.transform_index_html(url, html).await?;
                Ok(Arc::new(Template::split(&html, &self.config.placeholder)?))
            }
        }
    }

    /// Renderer for the current request.
    pub async fn renderer(&self) -> Result<Arc<dyn Renderer>, ServerError> {
        match &self.source {
            Source::Production { renderer, .. } => Ok(Arc::clone(renderer)),
            Source::Development { bundler } => Ok(bundler.load_renderer().await?),
        }
    }
}
