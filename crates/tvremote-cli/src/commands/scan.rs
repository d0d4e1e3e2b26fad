//! Scan command implementation.

use anyhow::{Context, Result};

use crate::config::resolve_secs;
use crate::format::{format_scan_json, format_scan_text};
use crate::style;

use super::{CommandContext, central_service};

pub async fn cmd_scan(
    ctx: &CommandContext,
    timeout: Option<u64>,
    retries: Option<u32>,
    all: bool,
) -> Result<()> {
    let scan = &ctx.config.scan;
    let pass_timeout = resolve_secs(timeout, scan.timeout_secs);
    let retry_count = retries.unwrap_or(scan.retry_count);
    let include_all = all || scan.include_all;

    let service = central_service(ctx.config.service_config()).await?;

    let spinner = ctx
        .interactive()
        .then(|| style::scanning_spinner(pass_timeout.as_secs(), retry_count));

    let ranked = service
        .discover(pass_timeout, retry_count, include_all)
        .await
        .context("Failed to scan for TVs");

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let ranked = ranked?;

    let content = if ctx.opts.json {
        format_scan_json(&ranked, &ctx.opts)?
    } else {
        format_scan_text(&ranked, &ctx.opts)
    };
    print!("{}", content);
    Ok(())
}
