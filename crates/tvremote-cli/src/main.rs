mod cli;
mod commands;
mod config;
mod format;
mod history;
mod style;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::CommandContext;
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "tvremote", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load_from(&config_path);
    let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();

    let ctx = CommandContext {
        config,
        config_path,
        opts: FormatOptions::new(no_color, cli.json),
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Scan {
            timeout,
            retries,
            all,
        } => commands::cmd_scan(&ctx, timeout, retries, all).await,
        Commands::Send {
            device,
            gap_ms,
            buttons,
        } => commands::cmd_send(&ctx, device, gap_ms, &buttons).await,
        Commands::Pair { name, timeout } => commands::cmd_pair(&ctx, name, timeout).await,
        Commands::Buttons => commands::cmd_buttons(&ctx),
        Commands::History { action } => commands::cmd_history(&ctx, action),
        Commands::Config { path, init } => commands::cmd_config(&ctx, path, init),
        Commands::Completions { .. } => Ok(()),
    }
}
