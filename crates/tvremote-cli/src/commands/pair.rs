//! Pair command: advertise as a remote and forward buttons typed on stdin.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use tvremote_core::{
    AdvertisingController, Advertiser, EventDispatcher, PairingEvent, PairingState, RemoteEvent,
};
use tvremote_types::Button;

use crate::config::resolve_secs;
use crate::format::format_event;

use super::CommandContext;

#[cfg(target_os = "linux")]
async fn advertiser() -> Result<Arc<dyn Advertiser>> {
    let advertiser = tvremote_core::BluezAdvertiser::new()
        .await
        .context("Failed to open the Bluetooth adapter")?;
    Ok(Arc::new(advertiser))
}

#[cfg(not(target_os = "linux"))]
async fn advertiser() -> Result<Arc<dyn Advertiser>> {
    Ok(Arc::new(tvremote_core::UnsupportedAdvertiser))
}

/// Parse one line of stdin into a button, ignoring blank lines.
fn parse_line(line: &str) -> Option<Result<Button, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.parse::<Button>().map_err(|e| e.to_string()))
}

pub async fn cmd_pair(
    ctx: &CommandContext,
    name: Option<String>,
    timeout: Option<u64>,
) -> Result<()> {
    let service_config = ctx.config.service_config();
    let mut options = service_config
        .pairing_options
        .timeout(resolve_secs(timeout, ctx.config.pairing.timeout_secs));
    if let Some(name) = name {
        options = options.device_name(name);
    }
    options.validate()?;

    let events = EventDispatcher::new(service_config.event_capacity);
    let mut rx = events.subscribe();
    let controller = AdvertisingController::new(advertiser().await?, options).with_events(events);

    controller
        .start_pairing()
        .await
        .context("Failed to enter pairing mode")?;
    if ctx.interactive() {
        eprintln!(
            "Pairing as '{}'. On the TV open Settings > Remotes & Accessories > Add accessory.",
            controller.options().device_name
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut connected = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.stop_pairing().await?;
            }
            event = rx.recv() => match event {
                Ok(event) => {
                    print_event(ctx, &event)?;
                    if let RemoteEvent::Pairing(PairingEvent::StateChanged { state }) = event {
                        connected = state == PairingState::Connected;
                        if connected && ctx.interactive() {
                            eprintln!("Type button names, one per line (see 'tvremote buttons').");
                        }
                        if state == PairingState::Idle {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Missed {} event(s)", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if connected && stdin_open => match line? {
                Some(line) => match parse_line(&line) {
                    Some(Ok(button)) => {
                        if let Err(e) = controller.send_command(button).await {
                            eprintln!("Failed to send {}: {}", button, e);
                        }
                    }
                    Some(Err(e)) => eprintln!("{}", e),
                    None => {}
                },
                None => stdin_open = false,
            },
        }
    }
    Ok(())
}

fn print_event(ctx: &CommandContext, event: &RemoteEvent) -> Result<()> {
    if ctx.opts.json {
        println!("{}", serde_json::to_string(event)?);
    } else if !ctx.quiet
        && let Some(line) = format_event(event, &ctx.opts)
    {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").is_none());
        assert_eq!(parse_line(" home ").unwrap().unwrap(), Button::Home);
        assert!(parse_line("teleport").unwrap().is_err());
    }
}
