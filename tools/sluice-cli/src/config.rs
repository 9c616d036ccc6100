//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sluice_core::ServerConfig;

/// File names searched for, in order, in each directory.
pub const CONFIG_NAMES: [&str; 3] = ["sluice.toml", ".sluice.toml", "sluice.json"];

/// Load a config file. `.json` files are JSON, everything else TOML.
///
/// Relative paths in the file are resolved against the file's directory.
pub fn load(path: &Path) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ServerConfig = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
    };

    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(rebase(config, dir)),
        _ => Ok(config),
    }
}

/// Find a config file in `start` or its ancestors.
pub fn find(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in &CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Resolve every relative path in `config` against `dir`.
fn rebase(mut config: ServerConfig, dir: &Path) -> ServerConfig {
    for path in [
        &mut config.template_path,
        &mut config.dist_template_path,
        &mut config.static_dir,
        &mut config.project_root,
    ] {
        if path.is_relative() {
            *path = dir.join(&*path);
        }
    }
    config
}
