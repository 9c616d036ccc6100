//! CLI execution context.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use sluice_core::ServerConfig;

use crate::config;
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Configuration from defaults, file, and environment. Flags are
    /// applied by each command.
    pub config: ServerConfig,
    /// Config file in use, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from an explicit config file or the nearest one found.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(cwd.join(path)),
            None => config::find(&cwd),
        };

        let mut config = match &config_path {
            Some(path) => {
                output.debug(&format!("Using config file {}", path.display()));
                config::load(path)?
            }
            None => ServerConfig::default(),
        };

        config
            .apply_env()
            .context("Invalid environment configuration")?;

        Ok(Self {
            config,
            config_path,
            output,
        })
    }
}
