//! CLI command implementations.

pub mod check;
pub mod config;
pub mod serve;

use clap::Args;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Base path all routes live under (overrides BASE).
    #[arg(short, long)]
    pub base: Option<String>,

    /// Serve the built client in production mode.
    #[arg(long)]
    pub production: bool,

    /// Milliseconds before an unfinished render is aborted.
    #[arg(long)]
    pub abort_delay_ms: Option<u64>,

    /// Minimum log level.
    #[arg(long, env = "SLUICE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Check the built production template instead of the source one.
    #[arg(long)]
    pub production: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    /// Print only the config file in use.
    #[arg(long)]
    pub source: bool,
}
