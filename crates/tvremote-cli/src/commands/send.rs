//! Send command: connect, press buttons, disconnect.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use tvremote_core::RemoteService;
use tvremote_types::{Button, UNKNOWN_NAME};

use crate::config::Config;
use crate::format::format_event;
use crate::history::HistoryFile;
use crate::style;

use super::{CommandContext, central_service};

/// Pick the TV: explicit argument, then the config default, then history.
pub fn resolve_device(
    device: Option<String>,
    config: &Config,
    history: &HistoryFile,
) -> Result<String> {
    if let Some(device) = device.or_else(|| config.device.clone()) {
        return Ok(device);
    }
    match history.preferred() {
        Some(address) => Ok(address),
        None => bail!(
            "No device specified. Use --device <ADDRESS> or set TVREMOTE_DEVICE.\n\
             Run 'tvremote scan' to find nearby TVs."
        ),
    }
}

pub async fn cmd_send(
    ctx: &CommandContext,
    device: Option<String>,
    gap_ms: u64,
    buttons: &[Button],
) -> Result<()> {
    let mut history = ctx.load_history();
    let address = resolve_device(device, &ctx.config, &history)?;
    let service = central_service(ctx.config.service_config()).await?;

    let spinner = ctx
        .interactive()
        .then(|| style::connecting_spinner(&address));
    let progress = spinner.clone().map(|pb| {
        let mut events = service.subscribe();
        let opts = ctx.opts;
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(line) = format_event(&event, &opts) {
                            pb.set_message(line);
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let connected = service
        .connect(&address)
        .await
        .with_context(|| format!("Failed to connect to {}", address));

    if let Some(task) = progress {
        task.abort();
    }
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let session = connected?;

    let name = session
        .name()
        .map(str::to_string)
        .or_else(|| history.get(&address).map(|e| e.name.clone()))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());
    history.record_connection(
        session.address(),
        &name,
        session.connected_at(),
        session.attempts(),
    );
    if let Err(e) = history.save() {
        warn!("Could not update history: {:#}", e);
    }

    let result = press_all(&service, &session, buttons, Duration::from_millis(gap_ms)).await;
    if let Err(e) = service.disconnect(&session).await {
        warn!("Disconnect failed: {}", e);
    }
    result?;

    if ctx.opts.json {
        #[derive(Serialize)]
        struct SendResult<'a> {
            address: &'a str,
            name: &'a str,
            attempts: u32,
            sent: &'a [Button],
        }
        print!(
            "{}",
            ctx.opts.as_json(&SendResult {
                address: session.address(),
                name: &name,
                attempts: session.attempts(),
                sent: buttons,
            })?
        );
    } else if !ctx.quiet {
        let names: Vec<_> = buttons.iter().map(|b| b.name()).collect();
        println!("Sent {} to {} ({})", names.join(", "), name, session.address());
    }
    Ok(())
}

/// Press each button in order, pausing `gap` between them.
async fn press_all(
    service: &RemoteService,
    session: &tvremote_core::Session,
    buttons: &[Button],
    gap: Duration,
) -> Result<()> {
    for (i, button) in buttons.iter().enumerate() {
        if i > 0 && !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
        service
            .send_command(session, *button)
            .await
            .with_context(|| format!("Failed to send {}", button))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn test_resolve_device_order() {
        let dir = tempdir().unwrap();
        let mut history = HistoryFile::load_from(dir.path().join("history.json"));
        let mut config = Config::default();

        assert!(resolve_device(None, &config, &history).is_err());

        history.record_connection("HIST", "TV", datetime!(2024-01-01 12:00 UTC), 1);
        assert_eq!(resolve_device(None, &config, &history).unwrap(), "HIST");

        config.device = Some("CONF".to_string());
        assert_eq!(resolve_device(None, &config, &history).unwrap(), "CONF");

        assert_eq!(
            resolve_device(Some("ARG".to_string()), &config, &history).unwrap(),
            "ARG"
        );
    }
}
