//! The remote's public facade.
//!
//! [`RemoteService`] ties the scanner, scorer, connection manager and pairing
//! controller together behind one operation gate: discovery, connecting and
//! pairing transitions never overlap, and requests that arrive while another
//! is running queue in arrival order. Sending a command on an established
//! session does not take the gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tvremote_types::{Button, UNKNOWN_NAME};

use crate::attempts::{AttemptState, AttemptStore};
use crate::connection::{ConnectOptions, ConnectionManager, Session};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver};
use crate::pairing::{AdvertisingController, PairingOptions, PairingSession, PairingState};
use crate::scan::{ScanOptions, Scanner};
use crate::scoring::{DEFAULT_RANK_LIMIT, QualityScorer, RankOptions, RankedPeripheral};
use crate::traits::{Advertiser, Central};

/// Configuration for a [`RemoteService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Defaults for discovery; timeout and retry count are overridden per call.
    pub scan_options: ScanOptions,
    /// Options for connecting and sending.
    pub connect_options: ConnectOptions,
    /// Options for pairing mode.
    pub pairing_options: PairingOptions,
    /// Cap on the number of ranked results; `None` returns all.
    pub rank_limit: Option<usize>,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scan_options: ScanOptions::default(),
            connect_options: ConnectOptions::default(),
            pairing_options: PairingOptions::default(),
            rank_limit: Some(DEFAULT_RANK_LIMIT),
            event_capacity: 100,
        }
    }
}

impl ServiceConfig {
    /// Validate every option group.
    pub fn validate(&self) -> Result<()> {
        self.scan_options.validate()?;
        self.connect_options.validate()?;
        self.pairing_options.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Scan, connect, send and pair through one serialized entry point.
pub struct RemoteService {
    central: Arc<dyn Central>,
    scorer: QualityScorer,
    connections: ConnectionManager,
    pairing: AdvertisingController,
    config: ServiceConfig,
    gate: Mutex<()>,
    discovery: Mutex<Option<CancellationToken>>,
    events: EventDispatcher,
}

impl RemoteService {
    /// Create a service over the given backends.
    pub fn new(
        central: Arc<dyn Central>,
        advertiser: Arc<dyn Advertiser>,
        config: ServiceConfig,
    ) -> Result<Self> {
        Self::with_store(central, advertiser, config, AttemptStore::new())
    }

    /// Create a service that keeps attempt state in `store`.
    pub fn with_store(
        central: Arc<dyn Central>,
        advertiser: Arc<dyn Advertiser>,
        config: ServiceConfig,
        store: AttemptStore,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventDispatcher::new(config.event_capacity);

        let connections =
            ConnectionManager::with_store(central.clone(), config.connect_options.clone(), store)
                .with_events(events.clone());
        let pairing = AdvertisingController::new(advertiser, config.pairing_options.clone())
            .with_events(events.clone());

        Ok(Self {
            central,
            scorer: QualityScorer::default(),
            connections,
            pairing,
            config,
            gate: Mutex::new(()),
            discovery: Mutex::new(None),
            events,
        })
    }

    /// Replace the scorer used to rank discovery results.
    #[must_use]
    pub fn with_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// The service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to discovery, connection and pairing events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Discover peripherals and rank them, best first.
    ///
    /// A new call cancels one that is still running or queued; the superseded
    /// call returns [`Error::Cancelled`].
    pub async fn discover(
        &self,
        pass_timeout: Duration,
        retry_count: u32,
        include_all: bool,
    ) -> Result<Vec<RankedPeripheral>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.discovery.lock().await.replace(token.clone()) {
            debug!("Cancelling previous discovery");
            previous.cancel();
        }

        let result = self
            .discover_gated(token.clone(), pass_timeout, retry_count, include_all)
            .await;

        let mut slot = self.discovery.lock().await;
        // Only a newer call cancels the token, and that call owns the slot.
        if !token.is_cancelled() {
            *slot = None;
        }
        result
    }

    async fn discover_gated(
        &self,
        token: CancellationToken,
        pass_timeout: Duration,
        retry_count: u32,
        include_all: bool,
    ) -> Result<Vec<RankedPeripheral>> {
        let _gate = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            gate = self.gate.lock() => gate,
        };

        let options = self
            .config
            .scan_options
            .clone()
            .pass_timeout(pass_timeout)
            .retry_count(retry_count);
        let records = Scanner::new(self.central.as_ref(), options)
            .with_events(self.events.clone())
            .with_cancellation(token)
            .discover()
            .await?;

        let rank_options = RankOptions::default()
            .include_all(include_all)
            .limit(self.config.rank_limit);
        let ranked = self.scorer.rank(&records, &rank_options);
        info!(
            "{} of {} peripheral(s) ranked",
            ranked.len(),
            records.len()
        );
        Ok(ranked)
    }

    /// Connect to `address`, retrying with backoff.
    pub async fn connect(&self, address: &str) -> Result<Session> {
        let _gate = self.gate.lock().await;
        self.connections.connect(address).await
    }

    /// Connect to a ranked discovery result, keeping its name on the session.
    pub async fn connect_ranked(&self, peripheral: &RankedPeripheral) -> Result<Session> {
        let _gate = self.gate.lock().await;
        let name = Some(peripheral.name.clone()).filter(|n| n != UNKNOWN_NAME);
        self.connections
            .connect_named(&peripheral.address, name)
            .await
    }

    /// Press and release `button` on a connected session.
    pub async fn send_command(&self, session: &Session, button: Button) -> Result<()> {
        self.connections.send_command(session, button).await
    }

    /// Close a session.
    pub async fn disconnect(&self, session: &Session) -> Result<()> {
        self.connections.disconnect(session).await
    }

    /// Enter pairing mode.
    pub async fn start_pairing(&self) -> Result<PairingState> {
        let _gate = self.gate.lock().await;
        self.pairing.start_pairing().await
    }

    /// Leave pairing mode.
    pub async fn stop_pairing(&self) -> Result<PairingState> {
        let _gate = self.gate.lock().await;
        self.pairing.stop_pairing().await
    }

    /// Toggle pairing mode.
    pub async fn toggle_pairing(&self) -> Result<PairingState> {
        let _gate = self.gate.lock().await;
        self.pairing.toggle_pairing().await
    }

    /// Press and release `button` on the TV connected in pairing mode.
    pub async fn send_pairing_command(&self, button: Button) -> Result<()> {
        self.pairing.send_command(button).await
    }

    /// Current pairing state.
    pub async fn pairing_state(&self) -> PairingState {
        self.pairing.state().await
    }

    /// Snapshot of the pairing session.
    pub async fn pairing_session(&self) -> PairingSession {
        self.pairing.session().await
    }

    /// Attempt state for `address`.
    pub async fn connection_history(&self, address: &str) -> AttemptState {
        self.connections.history(address).await
    }

    /// Forget attempt state for `address`, or for every address.
    pub async fn reset_connection_history(&self, address: Option<&str>) {
        match address {
            Some(address) => self.connections.reset_history(address).await,
            None => self.connections.reset_all_history().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdvertiser, MockCentral, MockConnect, MockPass};
    use tvremote_types::Sighting;

    fn service(central: &Arc<MockCentral>) -> RemoteService {
        let config = ServiceConfig {
            scan_options: ScanOptions::default()
                .settle_pause(Duration::ZERO)
                .empty_pass_pause(Duration::ZERO),
            ..Default::default()
        };
        RemoteService::new(central.clone(), Arc::new(MockAdvertiser::new()), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_ranks_results() {
        let central = Arc::new(MockCentral::new());
        central.push_pass(MockPass::Sightings(vec![
            Sighting::new("AA", Some("Android TV".into()), Some(-45)),
            Sighting::new("BB", Some("Unknown".into()), Some(-95)),
        ]));
        let svc = service(&central);

        let ranked = svc
            .discover(Duration::from_secs(1), 0, false)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, "AA");

        central.push_pass(MockPass::Sightings(vec![
            Sighting::new("AA", Some("Android TV".into()), Some(-45)),
            Sighting::new("BB", Some("Unknown".into()), Some(-95)),
        ]));
        let all = svc.discover(Duration::from_secs(1), 0, true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_discovery_cancels_previous() {
        let central = Arc::new(MockCentral::new());
        central.push_pass(MockPass::Hang);
        central.push_pass(MockPass::Sightings(vec![Sighting::new(
            "AA",
            Some("Bravia".into()),
            Some(-60),
        )]));
        let svc = Arc::new(service(&central));

        let first = tokio::spawn({
            let svc = svc.clone();
            async move { svc.discover(Duration::from_secs(10), 0, true).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = svc.discover(Duration::from_secs(1), 0, true).await.unwrap();
        assert!(matches!(first.await.unwrap(), Err(Error::Cancelled)));
        assert_eq!(second.len(), 1);
        assert!(svc.discovery.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_serializes_connect_and_discovery() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(
            crate::error::ConnectionFailureReason::Timeout,
        ));
        let svc = Arc::new(service(&central));

        // The connect retries for about a second while holding the gate.
        let connect = tokio::spawn({
            let svc = svc.clone();
            async move { svc.connect("AA").await }
        });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        svc.discover(Duration::from_secs(1), 0, true).await.unwrap();
        assert!(connect.await.unwrap().is_ok());
        // Discovery queued behind the connect's backoff wait.
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_reset() {
        let central = Arc::new(MockCentral::new());
        central.push_connect(MockConnect::Fail(
            crate::error::ConnectionFailureReason::Timeout,
        ));
        let svc = service(&central);
        svc.connect("AA").await.unwrap();
        assert_eq!(svc.connection_history("AA").await.attempt_count, 0);

        central.push_connect(MockConnect::Fail(
            crate::error::ConnectionFailureReason::UnsupportedDevice,
        ));
        assert!(svc.connect("BB").await.is_err());
        assert!(svc.connection_history("BB").await.last_failure.is_some());

        svc.reset_connection_history(Some("bb")).await;
        assert_eq!(svc.connection_history("BB").await.last_failure, None);

        central.push_connect(MockConnect::Fail(
            crate::error::ConnectionFailureReason::UnsupportedDevice,
        ));
        assert!(svc.connect("CC").await.is_err());
        svc.reset_connection_history(None).await;
        assert_eq!(svc.connection_history("CC").await.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_through_service() {
        let central = Arc::new(MockCentral::new());
        let svc = service(&central);

        assert_eq!(svc.toggle_pairing().await.unwrap(), PairingState::Advertising);
        assert_eq!(svc.start_pairing().await.unwrap(), PairingState::Advertising);
        assert_eq!(svc.stop_pairing().await.unwrap(), PairingState::Idle);
        assert_eq!(svc.pairing_session().await, PairingSession::default());
    }

    #[test]
    fn test_config_validate() {
        assert!(ServiceConfig::default().validate().is_ok());
        let config = ServiceConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
