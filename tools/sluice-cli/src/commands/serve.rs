//! Run the streaming SSR server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use hello_stream::HelloRenderer;
use sluice_core::{Mode, ServerConfig};
use sluice_observability::{init_logging, LogFormat, LogLevel};

use super::ServeArgs;
use crate::context::Context;

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = apply_flags(ctx.config.clone(), &args)
        .validate()
        .context("Invalid configuration")?;

    let level = if ctx.output.is_verbose() {
        LogLevel::Debug
    } else {
        args.log_level.parse()?
    };
    let format = if ctx.output.is_json() {
        LogFormat::Json
    } else {
        LogFormat::for_mode(config.mode)
    };
    init_logging(format, level)?;

    ctx.output.header("Starting server");
    ctx.output.kv("mode", &config.mode.to_string());
    ctx.output.kv("address", &config.bind_addr());
    ctx.output.kv("base", &config.base);
    ctx.output.kv("abort delay", &format!("{} ms", config.abort_delay_ms));

    let renderer = HelloRenderer::new()
        .with_base(config.base.clone())
        .with_sentinel(config.sentinel.clone());

    sluice_server::serve(config, Arc::new(renderer))
        .await
        .context("Server failed")?;

    ctx.output.success("Server stopped");
    Ok(())
}

/// Overlay command-line flags on the loaded configuration.
fn apply_flags(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
    if args.production {
        config.mode = Mode::Production;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(base) = &args.base {
        config.base = base.clone();
    }
    if let Some(ms) = args.abort_delay_ms {
        config = config.with_abort_delay(Duration::from_millis(ms));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ServeArgs {
        ServeArgs {
            port: None,
            base: None,
            production: false,
            abort_delay_ms: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let config = ServerConfig::default().with_port(9000);
        assert_eq!(apply_flags(config.clone(), &args()), config);
    }

    #[test]
    fn test_flags_override() {
        let args = ServeArgs {
            port: Some(3000),
            base: Some("app".to_string()),
            production: true,
            abort_delay_ms: Some(250),
            ..args()
        };

        let config = apply_flags(ServerConfig::default(), &args).validate().unwrap();
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.port, 3000);
        assert_eq!(config.base, "/app/");
        assert_eq!(config.abort_delay_ms, 250);
    }

    #[test]
    fn test_zero_abort_delay_rejected() {
        let args = ServeArgs {
            abort_delay_ms: Some(0),
            ..args()
        };
        assert!(apply_flags(ServerConfig::default(), &args).validate().is_err());
    }
}
