//! Buttons command implementation.

use anyhow::Result;

use crate::format::{format_buttons_json, format_buttons_text};

use super::CommandContext;

pub fn cmd_buttons(ctx: &CommandContext) -> Result<()> {
    let content = if ctx.opts.json {
        format_buttons_json(&ctx.opts)?
    } else {
        format_buttons_text()
    };
    print!("{}", content);
    Ok(())
}
