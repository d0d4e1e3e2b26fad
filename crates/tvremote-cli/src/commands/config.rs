//! Config command implementation.

use anyhow::{Context, Result};

use super::CommandContext;

pub fn cmd_config(ctx: &CommandContext, path: bool, init: bool) -> Result<()> {
    if path {
        println!("{}", ctx.config_path.display());
        return Ok(());
    }

    if init {
        ctx.config.save_to(&ctx.config_path)?;
        if !ctx.quiet {
            println!("Wrote {}", ctx.config_path.display());
        }
        return Ok(());
    }

    let content = if ctx.opts.json {
        ctx.opts.as_json(&ctx.config)?
    } else {
        toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?
    };
    print!("{}", content);
    Ok(())
}
