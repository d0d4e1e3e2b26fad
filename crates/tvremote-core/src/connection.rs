//! Connecting to a TV and sending button presses.
//!
//! [`ConnectionManager`] makes up to `max_attempts` connection attempts per
//! call, waiting the address's current backoff between them, and records every
//! attempt in the shared [`AttemptStore`]. A successful connect yields a
//! [`Session`] that button presses are written to.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use tvremote_types::{Button, ReportSequencer};

use crate::attempts::{AttemptState, AttemptStore};
use crate::backoff::BackoffPolicy;
use crate::error::{ConnectionFailureReason, Error, Result, is_retryable};
use crate::events::{ConnectionEvent, EventDispatcher};
use crate::traits::{Central, HidLink};

/// Default timeout for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default delay between a key press and its release.
pub const DEFAULT_INTER_REPORT_DELAY: Duration = Duration::from_millis(100);

/// Options for connecting and sending.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Attempts per `connect` call.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub backoff: BackoffPolicy,
    /// Timeout for a single attempt.
    pub connect_timeout: Duration,
    /// Delay between press and release reports.
    pub inter_report_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            inter_report_delay: DEFAULT_INTER_REPORT_DELAY,
        }
    }
}

impl ConnectOptions {
    /// Create new connect options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set attempts per call.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
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
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }
        self.backoff.validate()
    }
}

struct SessionInner {
    link: Arc<dyn HidLink>,
    name: Option<String>,
    connected_at: OffsetDateTime,
    attempts: u32,
    // Held across press and release so reports from concurrent sends never interleave.
    sequencer: Mutex<ReportSequencer>,
}

/// An established connection to a TV.
///
/// Cheap to clone; clones share the link.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address())
            .field("name", &self.inner.name)
            .field("connected_at", &self.inner.connected_at)
            .field("attempts", &self.inner.attempts)
            .finish()
    }
}

impl Session {
    fn new(link: Arc<dyn HidLink>, name: Option<String>, attempts: u32) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                link,
                name,
                connected_at: OffsetDateTime::now_utc(),
                attempts,
                sequencer: Mutex::new(ReportSequencer::new()),
            }),
        }
    }

    /// Address of the peer.
    pub fn address(&self) -> &str {
        self.inner.link.address()
    }

    /// Name the caller associated with the peer.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// When the connection was established.
    pub fn connected_at(&self) -> OffsetDateTime {
        self.inner.connected_at
    }

    /// Attempts the connect call needed.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts
    }

    /// Whether the link is still up.
    pub async fn is_connected(&self) -> bool {
        self.inner.link.is_connected().await
    }
}

/// Connects to peripherals with retry and sends commands over sessions.
pub struct ConnectionManager {
    central: Arc<dyn Central>,
    store: AttemptStore,
    options: ConnectOptions,
    events: Option<EventDispatcher>,
}

impl ConnectionManager {
    /// Create a manager with a fresh attempt store.
    pub fn new(central: Arc<dyn Central>, options: ConnectOptions) -> Self {
        Self::with_store(central, options, AttemptStore::new())
    }

    /// Create a manager over an existing attempt store.
    pub fn with_store(central: Arc<dyn Central>, options: ConnectOptions, store: AttemptStore) -> Self {
        Self {
            central,
            store,
            options,
            events: None,
        }
    }

    /// Publish connection activity on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// Options in use.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// The attempt store.
    pub fn store(&self) -> &AttemptStore {
        &self.store
    }

    /// Connect to `address`.
    pub async fn connect(&self, address: &str) -> Result<Session> {
        self.connect_named(address, None).await
    }

    /// Connect to `address`, remembering `name` on the session.
    #[tracing::instrument(level = "info", skip(self, name), fields(max_attempts = self.options.max_attempts))]
    pub async fn connect_named(&self, address: &str, name: Option<String>) -> Result<Session> {
        self.options.validate()?;

        let policy = &self.options.backoff;
        let max_attempts = self.options.max_attempts;
        let start = Instant::now();
        let mut last_reason = ConnectionFailureReason::Other("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.history(address).await.current_backoff;
                info!(
                    "Retrying {} in {:?} (attempt {}/{})",
                    address, delay, attempt, max_attempts
                );
                self.emit(ConnectionEvent::RetryScheduled {
                    address: address.to_string(),
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
                sleep(delay).await;
            }

            self.store.begin_attempt(address, policy).await;
            self.emit(ConnectionEvent::AttemptStarted {
                address: address.to_string(),
                attempt,
                max_attempts,
            });

            let result = match timeout(self.options.connect_timeout, self.central.connect(address)).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout("connect", self.options.connect_timeout)),
            };

            let error = match result {
                Ok(link) => {
                    self.store.record_success(address, policy).await;
                    info!("Connected to {} on attempt {}", address, attempt);
                    self.emit(ConnectionEvent::Connected {
                        address: address.to_string(),
                        attempts: attempt,
                    });
                    return Ok(Session::new(link, name, attempt));
                }
                Err(e) => e,
            };

            let reason = ConnectionFailureReason::from_error(&error);

            if !is_retryable(&error) || !reason.is_transient() {
                // Fatal faults do not count against the retry budget.
                self.store.abandon_attempt(address, reason.to_string()).await;
                warn!("Connection to {} failed fatally: {}", address, error);
                self.emit(ConnectionEvent::Failed {
                    address: address.to_string(),
                    attempts: attempt,
                    reason: reason.to_string(),
                });
                return Err(match error {
                    Error::AdapterUnavailable(_) | Error::Cancelled => error,
                    _ => Error::ConnectionFailed {
                        address: address.to_string(),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                        reason,
                    },
                });
            }

            self.store
                .record_failure(address, policy, reason.to_string())
                .await;
            warn!(
                "Connection attempt {}/{} to {} failed: {}",
                attempt, max_attempts, address, error
            );
            last_reason = reason;
        }

        warn!(
            "Giving up on {} after {} attempts",
            address, max_attempts
        );
        self.emit(ConnectionEvent::Failed {
            address: address.to_string(),
            attempts: max_attempts,
            reason: last_reason.to_string(),
        });
        Err(Error::ConnectionFailed {
            address: address.to_string(),
            attempts: max_attempts,
            elapsed: start.elapsed(),
            reason: last_reason,
        })
    }

    /// Attempt state for `address`; fresh state if it was never tried.
    pub async fn history(&self, address: &str) -> AttemptState {
        self.store
            .get(address)
            .await
            .unwrap_or_else(|| AttemptState::fresh(self.options.backoff.base))
    }

    /// Forget the attempt state of `address`.
    pub async fn reset_history(&self, address: &str) {
        debug!("Resetting connection history for {}", address);
        self.store.remove(address).await;
    }

    /// Forget all attempt state.
    pub async fn reset_all_history(&self) {
        debug!("Resetting all connection history");
        self.store.clear().await;
    }

    /// Press and release `button` on the session's peer.
    pub async fn send_command(&self, session: &Session, button: Button) -> Result<()> {
        self.send_usage_code(session, button.usage_code()).await
    }

    /// Press and release a raw usage code, which must be in the button table.
    pub async fn send_usage_code(&self, session: &Session, usage_code: u16) -> Result<()> {
        let button = Button::from_usage(usage_code).ok_or(Error::UnknownButton(usage_code))?;
        let address = session.address();
        let link = &session.inner.link;

        let mut sequencer = session.inner.sequencer.lock().await;

        if !link.is_connected().await {
            return Err(self
                .transport_failure(address, "session is no longer connected")
                .await);
        }

        let press = sequencer.press(usage_code)?;
        if let Err(e) = link.write_report(&press).await {
            // The press never reached the peer; nothing is held.
            let _ = sequencer.release();
            return Err(self
                .transport_failure(address, format!("press of {} failed: {}", button, e))
                .await);
        }

        sleep(self.options.inter_report_delay).await;

        let release = sequencer.release()?;
        if let Err(e) = link.write_report(&release).await {
            return Err(self
                .transport_failure(address, format!("release of {} failed: {}", button, e))
                .await);
        }

        debug!("Sent {} to {}", button, address);
        self.emit(ConnectionEvent::CommandSent {
            address: address.to_string(),
            button,
        });
        Ok(())
    }

    /// Close the session.
    pub async fn disconnect(&self, session: &Session) -> Result<()> {
        let address = session.address().to_string();
        session.inner.link.disconnect().await?;
        info!("Disconnected from {}", address);
        self.emit(ConnectionEvent::Disconnected { address });
        Ok(())
    }

    async fn transport_failure(&self, address: &str, reason: impl Into<String>) -> Error {
        let reason = reason.into();
        warn!("Transport error on {}: {}", address, reason);
        self.store.note_failure(address, reason.clone()).await;
        Error::transport(address, reason)
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterFault;
    use crate::mock::{MockCentral, MockConnect};
    use tvremote_types::hid::REPORT_ID;

    const TV: &str = "AA:BB:CC:DD:EE:01";

    fn manager(central: &Arc<MockCentral>, options: ConnectOptions) -> ConnectionManager {
        ConnectionManager::new(central.clone(), options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_first_try() {
        let central = Arc::new(MockCentral::new());
        let mgr = manager(&central, ConnectOptions::default());

        let session = mgr.connect(TV).await.unwrap();
        assert_eq!(session.address(), TV);
        assert_eq!(session.attempts(), 1);
        assert!(session.is_connected().await);
        assert_eq!(mgr.history(TV).await, AttemptState::fresh(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_resets_state() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        let mgr = manager(&central, ConnectOptions::default());

        let start = Instant::now();
        let session = mgr.connect(TV).await.unwrap();

        assert_eq!(session.attempts(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
        let state = mgr.history(TV).await;
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.current_backoff, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_state() {
        let central = Arc::new(MockCentral::new());
        for _ in 0..3 {
            central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        }
        let mgr = manager(&central, ConnectOptions::default());

        let start = Instant::now();
        let err = mgr.connect(TV).await.unwrap_err();

        match err {
            Error::ConnectionFailed {
                address,
                attempts,
                elapsed,
                reason,
            } => {
                assert_eq!(address, TV);
                assert_eq!(attempts, 3);
                assert_eq!(elapsed, Duration::from_secs(3));
                assert_eq!(reason, ConnectionFailureReason::OutOfRange);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(central.connect_calls(), 3);

        let state = mgr.history(TV).await;
        assert_eq!(state.attempt_count, 3);
        assert_eq!(state.current_backoff, Duration::from_secs(4));
        assert!(state.last_attempt_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_is_capped() {
        let central = Arc::new(MockCentral::new());
        for _ in 0..4 {
            central.push_connect(MockConnect::Fail(ConnectionFailureReason::Timeout));
        }
        let mgr = manager(&central, ConnectOptions::default().max_attempts(4));

        assert!(mgr.connect(TV).await.is_err());

        let times = central.connect_times();
        let gaps: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![1, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_persists_across_calls() {
        let central = Arc::new(MockCentral::new());
        for _ in 0..4 {
            central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        }
        let mgr = manager(&central, ConnectOptions::default());
        assert!(mgr.connect(TV).await.is_err());

        // First attempt of the next call is immediate, the retry waits the capped backoff.
        let start = Instant::now();
        let session = mgr.connect(TV).await.unwrap();
        assert_eq!(session.attempts(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_fault_short_circuits() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::PermissionDenied));
        let mgr = manager(&central, ConnectOptions::default());

        let start = Instant::now();
        let err = mgr.connect(TV).await.unwrap_err();

        assert!(matches!(
            err,
            Error::ConnectionFailed {
                attempts: 1,
                reason: ConnectionFailureReason::PermissionDenied,
                ..
            }
        ));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(central.connect_calls(), 1);
        let state = mgr.history(TV).await;
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.current_backoff, Duration::from_secs(1));
        assert!(state.last_failure.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_unavailable_propagates() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Adapter(AdapterFault::NoAdapter));
        let mgr = manager(&central, ConnectOptions::default());

        let err = mgr.connect(TV).await.unwrap_err();
        assert!(matches!(err, Error::AdapterUnavailable(AdapterFault::NoAdapter)));
        assert_eq!(mgr.history(TV).await.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_transient() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Hang);
        let mgr = manager(&central, ConnectOptions::default());

        let start = Instant::now();
        let session = mgr.connect(TV).await.unwrap();
        assert_eq!(session.attempts(), 2);
        assert_eq!(start.elapsed(), DEFAULT_CONNECT_TIMEOUT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_history() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::PermissionDenied));
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::PermissionDenied));
        let mgr = manager(&central, ConnectOptions::default());
        let _ = mgr.connect(TV).await;
        let _ = mgr.connect("AA:BB:CC:DD:EE:02").await;

        mgr.reset_history(TV).await;
        assert_eq!(mgr.history(TV).await.last_failure, None);
        assert!(mgr.history("AA:BB:CC:DD:EE:02").await.last_failure.is_some());

        mgr.reset_all_history().await;
        assert!(mgr.store().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_press_then_release() {
        let central = Arc::new(MockCentral::new());
        let mgr = manager(&central, ConnectOptions::default());
        let session = mgr.connect(TV).await.unwrap();

        mgr.send_command(&session, Button::Home).await.unwrap();

        let link = central.last_link().unwrap();
        let writes = link.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1, vec![REPORT_ID, 0x23, 0x02]);
        assert_eq!(writes[1].1, vec![REPORT_ID, 0x00, 0x00]);
        assert_eq!(writes[1].0 - writes[0].0, DEFAULT_INTER_REPORT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_unknown_usage_code() {
        let central = Arc::new(MockCentral::new());
        let mgr = manager(&central, ConnectOptions::default());
        let session = mgr.connect(TV).await.unwrap();

        let err = mgr.send_usage_code(&session, 0x0777).await.unwrap_err();
        assert!(matches!(err, Error::UnknownButton(0x0777)));
        assert!(central.last_link().unwrap().writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_disconnect_is_transport_error() {
        let central = Arc::new(MockCentral::new());
        let mgr = manager(&central, ConnectOptions::default());
        let session = mgr.connect(TV).await.unwrap();
        central.last_link().unwrap().drop_connection();

        let err = mgr.send_command(&session, Button::Back).await.unwrap_err();
        assert!(matches!(err, Error::TransportError { .. }));
        assert_eq!(
            mgr.history(TV).await.last_failure.as_deref(),
            Some("session is no longer connected")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_failure_is_transport_error() {
        let central = Arc::new(MockCentral::new());
        let mgr = manager(&central, ConnectOptions::default());
        let session = mgr.connect(TV).await.unwrap();
        let link = central.last_link().unwrap();
        link.fail_writes_after(1);

        let err = mgr.send_command(&session, Button::Mute).await.unwrap_err();
        assert!(matches!(err, Error::TransportError { .. }));
        assert_eq!(link.writes().len(), 1);

        // The sequencer is not left holding the key.
        link.fail_writes_after(usize::MAX);
        mgr.send_command(&session, Button::Mute).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_do_not_interleave() {
        let central = Arc::new(MockCentral::new());
        let mgr = Arc::new(manager(&central, ConnectOptions::default()));
        let session = mgr.connect(TV).await.unwrap();

        let (a, b) = tokio::join!(
            mgr.send_command(&session, Button::VolumeUp),
            mgr.send_command(&session, Button::VolumeDown)
        );
        a.unwrap();
        b.unwrap();

        let payloads: Vec<Vec<u8>> = central
            .last_link()
            .unwrap()
            .writes()
            .into_iter()
            .map(|(_, data)| data)
            .collect();
        assert_eq!(
            payloads,
            vec![
                vec![REPORT_ID, 0xE9, 0x00],
                vec![REPORT_ID, 0x00, 0x00],
                vec![REPORT_ID, 0xEA, 0x00],
                vec![REPORT_ID, 0x00, 0x00],
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_emits_event() {
        let central = Arc::new(MockCentral::new());
        let events = EventDispatcher::new(16);
        let mut rx = events.subscribe();
        let mgr = manager(&central, ConnectOptions::default()).with_events(events);

        let session = mgr.connect(TV).await.unwrap();
        mgr.disconnect(&session).await.unwrap();
        assert!(!session.is_connected().await);

        let mut saw_disconnect = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(
                event,
                crate::events::RemoteEvent::Connection(ConnectionEvent::Disconnected { .. })
            ) {
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_events_carry_delay() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        central.push_connect(MockConnect::Fail(ConnectionFailureReason::OutOfRange));
        let events = EventDispatcher::new(16);
        let mut rx = events.subscribe();
        let mgr = manager(&central, ConnectOptions::default()).with_events(events);

        mgr.connect(TV).await.unwrap();

        let mut delays = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let crate::events::RemoteEvent::Connection(ConnectionEvent::RetryScheduled {
                delay_ms,
                ..
            }) = event
            {
                delays.push(delay_ms);
            }
        }
        assert_eq!(delays, vec![1000, 2000]);
    }

    #[test]
    fn test_options_validate() {
        assert!(ConnectOptions::default().validate().is_ok());
        assert!(ConnectOptions::default().max_attempts(0).validate().is_err());
        assert!(
            ConnectOptions::default()
                .connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
