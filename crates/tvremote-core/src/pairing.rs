//! Pairing mode: advertising this machine as a HID remote.
//!
//! In pairing mode the roles are reversed: instead of connecting to the TV,
//! the computer advertises the HID service and waits for the TV to connect
//! (Android TV: *Settings → Remotes & Accessories → Add accessory*).
//!
//! ```text
//!            start_pairing()                 peer connects
//!   Idle ────────────────────▶ Advertising ─────────────────▶ Connected
//!    ▲                          │  timeout / stop_pairing()       │
//!    └──────────────────────────┘◀────────────────────────────────┘
//!                                   peer disconnects / stop_pairing()
//! ```
//!
//! While advertising or connected, a driver task owns the advertisement
//! handle. It reacts to the pairing timer, to peer events from the backend and
//! to outgoing button presses, and releases the handle exactly once when it
//! exits, whatever the reason.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tvremote_types::{Button, ReportSequencer};

use crate::error::{AdapterFault, Error, Result};
use crate::events::{EventDispatcher, PairingEvent};
use crate::traits::{AdvertisementHandle, Advertiser, PeerEvent};

/// Name the remote advertises by default.
pub const DEFAULT_DEVICE_NAME: &str = "Android TV Remote";

/// How long pairing mode waits for a TV by default.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(120);

/// Pairing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    /// Not advertising.
    Idle,
    /// Discoverable, waiting for a TV.
    Advertising,
    /// A TV is connected.
    Connected,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingState::Idle => write!(f, "idle"),
            PairingState::Advertising => write!(f, "advertising"),
            PairingState::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of pairing mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSession {
    /// Current state.
    pub state: PairingState,
    /// When advertising started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// When advertising gives up; only set while advertising.
    #[serde(with = "time::serde::rfc3339::option")]
    pub timeout_at: Option<OffsetDateTime>,
    /// Address of the connected TV, if known.
    pub peer: Option<String>,
}

impl Default for PairingSession {
    fn default() -> Self {
        Self {
            state: PairingState::Idle,
            started_at: None,
            timeout_at: None,
            peer: None,
        }
    }
}

/// Options for pairing mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingOptions {
    /// Local name to advertise.
    pub device_name: String,
    /// How long to advertise before giving up.
    pub timeout: Duration,
    /// Delay between press and release notifications.
    pub inter_report_delay: Duration,
    /// Device Information: manufacturer name.
    pub manufacturer: String,
    /// Device Information: model number.
    pub model: String,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            timeout: DEFAULT_PAIRING_TIMEOUT,
            inter_report_delay: Duration::from_millis(100),
            manufacturer: "tvremote".to_string(),
            model: "BLE HID Remote".to_string(),
        }
    }
}

impl PairingOptions {
    /// Create new pairing options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised name.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the pairing timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the press/release delay.
    #[must_use]
    pub fn inter_report_delay(mut self, delay: Duration) -> Self {
        self.inter_report_delay = delay;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "device_name cannot be empty".to_string(),
            ));
        }
        // Legacy advertising payloads leave room for about 29 bytes of name.
        if self.device_name.len() > 29 {
            return Err(Error::InvalidConfig(format!(
                "device_name '{}' is longer than 29 bytes",
                self.device_name
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "pairing timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

enum DriverCommand {
    Send {
        button: Button,
        reply: oneshot::Sender<Result<()>>,
    },
}

struct Driver {
    cancel: CancellationToken,
    commands: mpsc::Sender<DriverCommand>,
    task: JoinHandle<()>,
}

impl Driver {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Pairing task ended abnormally: {}", e);
        }
    }
}

/// Drives the pairing state machine over an [`Advertiser`].
pub struct AdvertisingController {
    advertiser: Arc<dyn Advertiser>,
    options: PairingOptions,
    session: Arc<RwLock<PairingSession>>,
    driver: Mutex<Option<Driver>>,
    events: Option<EventDispatcher>,
}

impl AdvertisingController {
    /// Create a controller.
    pub fn new(advertiser: Arc<dyn Advertiser>, options: PairingOptions) -> Self {
        Self {
            advertiser,
            options,
            session: Arc::new(RwLock::new(PairingSession::default())),
            driver: Mutex::new(None),
            events: None,
        }
    }

    /// Publish pairing activity on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// Options in use.
    pub fn options(&self) -> &PairingOptions {
        &self.options
    }

    /// Current state.
    pub async fn state(&self) -> PairingState {
        self.session.read().await.state
    }

    /// Snapshot of the pairing session.
    pub async fn session(&self) -> PairingSession {
        self.session.read().await.clone()
    }

    /// Enter pairing mode. A no-op when already advertising or connected.
    #[tracing::instrument(level = "info", skip_all, fields(device_name = %self.options.device_name))]
    pub async fn start_pairing(&self) -> Result<PairingState> {
        let mut driver = self.driver.lock().await;

        // A driver that timed out or lost its backend has already gone idle.
        if driver.as_ref().is_some_and(|d| d.task.is_finished())
            && let Some(finished) = driver.take()
        {
            finished.shutdown().await;
        }

        let current = self.session.read().await.state;
        if current != PairingState::Idle {
            info!("Pairing mode already active ({})", current);
            return Ok(current);
        }

        self.options.validate()?;
        let handle = self.advertiser.advertise(&self.options).await?;

        let now = OffsetDateTime::now_utc();
        *self.session.write().await = PairingSession {
            state: PairingState::Advertising,
            started_at: Some(now),
            timeout_at: Some(now + self.options.timeout),
            peer: None,
        };
        info!(
            "Advertising as '{}' for {:?}",
            self.options.device_name, self.options.timeout
        );
        emit(
            &self.events,
            PairingEvent::StateChanged {
                state: PairingState::Advertising,
            },
        );

        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(drive(
            handle,
            command_rx,
            cancel.clone(),
            self.session.clone(),
            self.events.clone(),
            self.options.clone(),
        ));

        *driver = Some(Driver {
            cancel,
            commands,
            task,
        });
        Ok(PairingState::Advertising)
    }

    /// Leave pairing mode. A no-op when idle.
    ///
    /// Returns once the advertisement has been torn down.
    pub async fn stop_pairing(&self) -> Result<PairingState> {
        let mut driver = self.driver.lock().await;
        match driver.take() {
            Some(active) => {
                debug!("Stopping pairing mode");
                active.shutdown().await;
            }
            None => debug!("Pairing mode not active"),
        }
        Ok(self.session.read().await.state)
    }

    /// Start pairing when idle, stop it otherwise.
    pub async fn toggle_pairing(&self) -> Result<PairingState> {
        if self.state().await == PairingState::Idle {
            self.start_pairing().await
        } else {
            self.stop_pairing().await
        }
    }

    /// Press and release `button` on the connected TV.
    pub async fn send_command(&self, button: Button) -> Result<()> {
        let commands = self
            .driver
            .lock()
            .await
            .as_ref()
            .map(|d| d.commands.clone());

        let session = self.session().await;
        let peer = session.peer.unwrap_or_else(|| "pairing-peer".to_string());
        let commands = match (session.state, commands) {
            (PairingState::Connected, Some(commands)) => commands,
            (state, _) => {
                return Err(Error::transport(
                    peer,
                    format!("no TV connected (pairing {})", state),
                ));
            }
        };

        let (reply, reply_rx) = oneshot::channel();
        commands
            .send(DriverCommand::Send { button, reply })
            .await
            .map_err(|_| Error::transport(&peer, "pairing mode ended"))?;
        reply_rx
            .await
            .map_err(|_| Error::transport(&peer, "pairing mode ended"))?
    }
}

fn emit(events: &Option<EventDispatcher>, event: PairingEvent) {
    if let Some(events) = events {
        events.send(event);
    }
}

enum Exit {
    Stopped,
    TimedOut,
    PeerLeft,
    BackendClosed,
}

async fn drive(
    mut handle: Box<dyn AdvertisementHandle>,
    mut commands: mpsc::Receiver<DriverCommand>,
    cancel: CancellationToken,
    session: Arc<RwLock<PairingSession>>,
    events: Option<EventDispatcher>,
    options: PairingOptions,
) {
    let deadline = Instant::now() + options.timeout;
    let mut sequencer = ReportSequencer::new();

    let exit = loop {
        let state = session.read().await.state;
        let advertising = state == PairingState::Advertising;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Exit::Stopped,
            _ = sleep_until(deadline), if advertising => break Exit::TimedOut,
            event = handle.next_peer_event() => match event {
                Some(PeerEvent::Connected { address }) => {
                    if state == PairingState::Connected {
                        debug!("Ignoring duplicate peer connection");
                        continue;
                    }
                    info!("TV connected: {}", address.as_deref().unwrap_or("unknown"));
                    {
                        let mut s = session.write().await;
                        s.state = PairingState::Connected;
                        s.timeout_at = None;
                        s.peer = address.clone();
                    }
                    emit(&events, PairingEvent::PeerConnected { address });
                    emit(&events, PairingEvent::StateChanged { state: PairingState::Connected });
                }
                Some(PeerEvent::Disconnected) => {
                    if state == PairingState::Connected {
                        break Exit::PeerLeft;
                    }
                    debug!("Ignoring disconnect while {}", state);
                }
                None => break Exit::BackendClosed,
            },
            Some(command) = commands.recv() => match command {
                DriverCommand::Send { button, reply } => {
                    let result = if state == PairingState::Connected {
                        let peer = session.read().await.peer.clone();
                        send_button(handle.as_mut(), &mut sequencer, button, &options, peer).await
                    } else {
                        Err(Error::transport("pairing-peer", "no TV connected"))
                    };
                    if result.is_ok() {
                        emit(&events, PairingEvent::CommandSent { button });
                    }
                    let _ = reply.send(result);
                }
            },
        }
    };

    if let Err(e) = handle.stop().await {
        warn!("Failed to stop advertising cleanly: {}", e);
    }
    drop(handle);

    match exit {
        Exit::Stopped => info!("Pairing mode stopped"),
        Exit::TimedOut => {
            info!("Pairing timed out after {:?}", options.timeout);
            emit(
                &events,
                PairingEvent::TimedOut {
                    after_secs: options.timeout.as_secs(),
                },
            );
        }
        Exit::PeerLeft => {
            info!("TV disconnected");
            emit(&events, PairingEvent::PeerDisconnected);
        }
        Exit::BackendClosed => warn!("Advertising backend went away"),
    }

    *session.write().await = PairingSession::default();
    emit(
        &events,
        PairingEvent::StateChanged {
            state: PairingState::Idle,
        },
    );
}

async fn send_button(
    handle: &mut dyn AdvertisementHandle,
    sequencer: &mut ReportSequencer,
    button: Button,
    options: &PairingOptions,
    peer: Option<String>,
) -> Result<()> {
    let peer = peer.unwrap_or_else(|| "pairing-peer".to_string());

    let press = sequencer.press(button.usage_code())?;
    if let Err(e) = handle.notify(&press).await {
        let _ = sequencer.release();
        return Err(Error::transport(
            peer,
            format!("press of {} failed: {}", button, e),
        ));
    }

    sleep(options.inter_report_delay).await;

    let release = sequencer.release()?;
    handle.notify(&release).await.map_err(|e| {
        Error::transport(&peer, format!("release of {} failed: {}", button, e))
    })?;
    debug!("Sent {} to {}", button, peer);
    Ok(())
}

/// [`Advertiser`] for platforms without a peripheral-role backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedAdvertiser;

#[async_trait::async_trait]
impl Advertiser for UnsupportedAdvertiser {
    async fn advertise(&self, _options: &PairingOptions) -> Result<Box<dyn AdvertisementHandle>> {
        Err(Error::AdapterUnavailable(AdapterFault::Other(
            "pairing mode is not supported on this platform".to_string(),
        )))
    }
}
