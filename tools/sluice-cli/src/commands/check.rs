//! Check that the shell template loads and splits.

use anyhow::{Context as _, Result};
use serde::Serialize;
use sluice_streaming::{read_template, Template};

use super::CheckArgs;
use crate::context::Context;
use crate::output::format_bytes;

#[derive(Debug, Serialize)]
struct CheckReport {
    template: String,
    placeholder: String,
    head_bytes: usize,
    tail_bytes: usize,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let path = if args.production || ctx.config.mode.is_production() {
        &ctx.config.dist_template_path
    } else {
        &ctx.config.template_path
    };

    ctx.output.header("Checking template");
    ctx.output.debug(&format!("Reading {}", path.display()));

    let html = read_template(path).await?;
    let template = Template::split(&html, &ctx.config.placeholder)
        .with_context(|| format!("Template {} cannot be split", path.display()))?;

    let report = CheckReport {
        template: path.display().to_string(),
        placeholder: ctx.config.placeholder.clone(),
        head_bytes: template.head().len(),
        tail_bytes: template.tail().len(),
    };

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.kv("template", &report.template);
    ctx.output.kv("placeholder", &report.placeholder);
    ctx.output.kv("head", &format_bytes(report.head_bytes as u64));
    ctx.output.kv("tail", &format_bytes(report.tail_bytes as u64));
    if html.matches(report.placeholder.as_str()).count() > 1 {
        ctx.output
            .warn("Placeholder occurs more than once; only the first is replaced");
    }
    ctx.output.success("Template is valid");

    Ok(())
}
