//! History command implementation.

use anyhow::{Result, bail};

use crate::cli::HistoryAction;
use crate::format::{format_history_json, format_history_text};
use crate::history::HistoryFile;

use super::CommandContext;

pub fn cmd_history(ctx: &CommandContext, action: Option<HistoryAction>) -> Result<()> {
    let mut history = ctx.load_history();
    let message = apply(&mut history, action.unwrap_or(HistoryAction::List))?;

    match message {
        None => {
            let entries = history.sorted();
            let content = if ctx.opts.json {
                format_history_json(&entries, &ctx.opts)?
            } else {
                format_history_text(&entries, &ctx.opts)
            };
            print!("{}", content);
        }
        Some(message) => {
            history.save()?;
            if !ctx.quiet {
                println!("{}", message);
            }
        }
    }
    Ok(())
}

/// Apply an edit. Returns a confirmation for edits, `None` for listing.
fn apply(history: &mut HistoryFile, action: HistoryAction) -> Result<Option<String>> {
    let message = match action {
        HistoryAction::List => return Ok(None),
        HistoryAction::Favorite { address } => {
            if !history.set_favorite(&address, true) {
                bail!("{} is not in the history", address);
            }
            format!("Pinned {}", address)
        }
        HistoryAction::Unfavorite { address } => {
            if !history.set_favorite(&address, false) {
                bail!("{} is not in the history", address);
            }
            format!("Unpinned {}", address)
        }
        HistoryAction::Forget { address } => {
            if !history.forget(&address) {
                bail!("{} is not in the history", address);
            }
            format!("Forgot {}", address)
        }
        HistoryAction::Clear => {
            history.clear();
            "History cleared".to_string()
        }
    };
    Ok(Some(message))
}
