//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5173;
/// Default abort delay in milliseconds.
pub const DEFAULT_ABORT_DELAY_MS: u64 = 10_000;
/// Default template marker.
pub const DEFAULT_PLACEHOLDER: &str = "<!--app-html-->";
/// Default end-of-render sentinel.
pub const DEFAULT_SENTINEL: &str = "<vite-streaming-end></vite-streaming-end>";

/// Runtime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Template reloaded per request, dev bundler wired in.
    #[default]
    Development,
    /// Template cached once, static assets served with compression.
    Production,
}

impl Mode {
    /// Interpret a `NODE_ENV`-style value. Only `production` selects production.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    /// Whether this is production mode.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("abort_delay_ms must be greater than zero")]
    ZeroAbortDelay,

    #[error("channel_capacity must be greater than zero")]
    ZeroCapacity,
}

/// Configuration for the SSR server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Development or production behavior.
    pub mode: Mode,
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// URL path prefix every route lives under.
    pub base: String,
    /// Delay before an unfinished render is aborted.
    pub abort_delay_ms: u64,
    /// Source template used in development.
    pub template_path: PathBuf,
    /// Built template used in production.
    pub dist_template_path: PathBuf,
    /// Built client assets served in production.
    pub static_dir: PathBuf,
    /// Project root served by the dev bundler.
    pub project_root: PathBuf,
    /// Marker splitting the template into head and tail.
    pub placeholder: String,
    /// Marker the renderer emits after its last dynamic chunk.
    pub sentinel: String,
    /// Rendered chunks buffered between renderer and socket.
    pub channel_capacity: usize,
    /// Plain-text body returned on fatal errors.
    pub error_body: String,
    /// Client script injected into the template in development.
    pub dev_client_script: Option<String>,
    /// Whether responses are compressed in production.
    pub compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            base: "/".to_string(),
            abort_delay_ms: DEFAULT_ABORT_DELAY_MS,
            template_path: PathBuf::from("index.html"),
            dist_template_path: PathBuf::from("dist/client/index.html"),
            static_dir: PathBuf::from("dist/client"),
            project_root: PathBuf::from("."),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            channel_capacity: 16,
            error_body: "Server Error".to_string(),
            dev_client_script: Some("/@vite/client".to_string()),
            compression: true,
        }
    }
}

impl ServerConfig {
    /// Create a configuration for the given mode.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the base path. Normalized on `validate`.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Set the abort delay.
    pub fn with_abort_delay(mut self, delay: Duration) -> Self {
        self.abort_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the template marker.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Set the end-of-render sentinel.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Overlay `NODE_ENV`, `PORT` and `BASE` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay environment values from an arbitrary lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("NODE_ENV") {
            self.mode = Mode::from_env_value(&env);
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(base) = lookup("BASE") {
            self.base = base;
        }
        Ok(())
    }

    /// Check invariants and normalize the base path.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.base = normalize_base(&self.base);
        if self.placeholder.is_empty() {
            return Err(ConfigError::Empty("placeholder"));
        }
        if self.sentinel.is_empty() {
            return Err(ConfigError::Empty("sentinel"));
        }
        if self.abort_delay_ms == 0 {
            return Err(ConfigError::ZeroAbortDelay);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(self)
    }

    /// Abort delay as a `Duration`.
    pub fn abort_delay(&self) -> Duration {
        Duration::from_millis(self.abort_delay_ms)
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Normalize a base path so it starts and ends with `/`.
pub fn normalize_base(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
