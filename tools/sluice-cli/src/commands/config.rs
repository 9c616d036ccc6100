//! Show the effective configuration.

use anyhow::Result;

use super::ConfigArgs;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    if args.source {
        return show_source(ctx);
    }

    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Effective Configuration");
    show_source(ctx)?;
    println!();
    print!("{}", toml::to_string_pretty(&ctx.config)?);

    Ok(())
}

fn show_source(ctx: &Context) -> Result<()> {
    let source = ctx
        .config_path
        .as_ref()
        .map(|path| path.display().to_string());

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "source": source }));
    } else {
        match source {
            Some(path) => ctx.output.kv("source", &path),
            None => ctx.output.info("No config file found; using defaults and environment"),
        }
    }
    Ok(())
}
