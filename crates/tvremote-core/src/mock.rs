//! Mock backends for testing.
//!
//! These implement the traits in [`crate::traits`] in memory so discovery,
//! connection and pairing logic can be exercised without Bluetooth hardware.
//! They pair well with tokio's paused clock: scan passes sleep for their
//! listening window and every write is timestamped with
//! [`tokio::time::Instant`].
//!
//! # Features
//!
//! - **Scripted outcomes**: queue scan passes and connection results
//! - **Failure injection**: fail writes, notifications or advertising
//! - **Peer simulation**: connect and disconnect a fake TV in pairing mode

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use tvremote_types::Sighting;

use crate::error::{AdapterFault, ConnectionFailureReason, Error, Result};
use crate::pairing::PairingOptions;
use crate::traits::{AdvertisementHandle, Advertiser, Central, HidLink, PeerEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted result of one scan pass.
#[derive(Debug, Clone)]
pub enum MockPass {
    /// Listen for the full window, then report these sightings.
    Sightings(Vec<Sighting>),
    /// Fail immediately with a transient Bluetooth error.
    Transient(String),
    /// Fail immediately with an adapter fault.
    AdapterFault(AdapterFault),
    /// Never complete.
    Hang,
}

/// Scripted result of one connection attempt.
#[derive(Debug, Clone)]
pub enum MockConnect {
    /// Connect successfully.
    Succeed,
    /// Fail with the given reason.
    Fail(ConnectionFailureReason),
    /// Fail with an adapter fault.
    Adapter(AdapterFault),
    /// Never complete.
    Hang,
}

/// A mock central. Unscripted passes see nothing; unscripted connects succeed.
#[derive(Debug, Default)]
pub struct MockCentral {
    passes: Mutex<VecDeque<MockPass>>,
    connects: Mutex<VecDeque<MockConnect>>,
    scan_calls: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
    links: Mutex<Vec<Arc<MockLink>>>,
}

impl MockCentral {
    /// Create a mock central with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next scan pass.
    pub fn push_pass(&self, pass: MockPass) {
        lock(&self.passes).push_back(pass);
    }

    /// Queue the result of the next connection attempt.
    pub fn push_connect(&self, outcome: MockConnect) {
        lock(&self.connects).push_back(outcome);
    }

    /// Number of scan passes run.
    pub fn scan_calls(&self) -> u32 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    /// Number of connection attempts made.
    pub fn connect_calls(&self) -> usize {
        lock(&self.connect_times).len()
    }

    /// When each connection attempt started.
    pub fn connect_times(&self) -> Vec<Instant> {
        lock(&self.connect_times).clone()
    }

    /// The most recently created link.
    pub fn last_link(&self) -> Option<Arc<MockLink>> {
        lock(&self.links).last().cloned()
    }
}

#[async_trait]
impl Central for MockCentral {
    async fn scan_pass(&self, duration: Duration) -> Result<Vec<Sighting>> {
        self.scan_calls.fetch_add(1, Ordering::Relaxed);
        let pass = lock(&self.passes)
            .pop_front()
            .unwrap_or(MockPass::Sightings(Vec::new()));

        match pass {
            MockPass::Sightings(sightings) => {
                sleep(duration).await;
                Ok(sightings)
            }
            MockPass::Transient(msg) => Err(Error::Bluetooth(btleplug::Error::RuntimeError(msg))),
            MockPass::AdapterFault(fault) => Err(Error::AdapterUnavailable(fault)),
            MockPass::Hang => std::future::pending().await,
        }
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn HidLink>> {
        lock(&self.connect_times).push(Instant::now());
        let outcome = lock(&self.connects)
            .pop_front()
            .unwrap_or(MockConnect::Succeed);

        match outcome {
            MockConnect::Succeed => {
                let link = Arc::new(MockLink::new(address));
                lock(&self.links).push(link.clone());
                Ok(link)
            }
            MockConnect::Fail(reason) => Err(Error::attempt_failed(address, reason)),
            MockConnect::Adapter(fault) => Err(Error::AdapterUnavailable(fault)),
            MockConnect::Hang => std::future::pending().await,
        }
    }
}

/// A mock link that records every report written to it.
#[derive(Debug)]
pub struct MockLink {
    address: String,
    connected: AtomicBool,
    writes: Mutex<Vec<(Instant, Vec<u8>)>>,
    /// Writes allowed before every further write fails.
    write_budget: AtomicUsize,
}

impl MockLink {
    /// Create a connected link.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            connected: AtomicBool::new(true),
            writes: Mutex::new(Vec::new()),
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Successful writes with their timestamps.
    pub fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    /// Let `n` more writes in total succeed, then fail the rest.
    pub fn fail_writes_after(&self, n: usize) {
        let done = lock(&self.writes).len();
        self.write_budget
            .store(done.saturating_add(n), Ordering::Relaxed);
    }

    /// Simulate the peer going away.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

#[async_trait]
impl HidLink for MockLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn write_report(&self, report: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::transport(&self.address, "not connected"));
        }
        let mut writes = lock(&self.writes);
        if writes.len() >= self.write_budget.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }
        writes.push((Instant::now(), report.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AdvertiserState {
    advertise_calls: AtomicU32,
    stop_calls: AtomicU32,
    active: AtomicBool,
    fail_advertise: AtomicBool,
    fail_notify: AtomicBool,
    last_name: Mutex<Option<String>>,
    peer_tx: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    notifications: Mutex<Vec<(Instant, Vec<u8>)>>,
}

/// A mock advertiser with a controllable fake TV.
#[derive(Debug, Clone, Default)]
pub struct MockAdvertiser {
    state: Arc<AdvertiserState>,
}

impl MockAdvertiser {
    /// Create a mock advertiser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `advertise` calls fail.
    pub fn set_fail_advertise(&self, fail: bool) {
        self.state.fail_advertise.store(fail, Ordering::Relaxed);
    }

    /// Make notifications fail.
    pub fn set_fail_notify(&self, fail: bool) {
        self.state.fail_notify.store(fail, Ordering::Relaxed);
    }

    /// Simulate a TV connecting. Returns `false` if nothing is advertising.
    pub fn connect_peer(&self, address: &str) -> bool {
        self.send_peer_event(PeerEvent::Connected {
            address: Some(address.to_string()),
        })
    }

    /// Simulate the TV disconnecting.
    pub fn disconnect_peer(&self) -> bool {
        self.send_peer_event(PeerEvent::Disconnected)
    }

    /// Simulate the backend going away entirely.
    pub fn close_backend(&self) {
        lock(&self.state.peer_tx).take();
    }

    fn send_peer_event(&self, event: PeerEvent) -> bool {
        lock(&self.state.peer_tx)
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Number of `advertise` calls.
    pub fn advertise_count(&self) -> u32 {
        self.state.advertise_calls.load(Ordering::Relaxed)
    }

    /// Number of `stop` calls on any handle, repeats included.
    pub fn stop_count(&self) -> u32 {
        self.state.stop_calls.load(Ordering::Relaxed)
    }

    /// Whether an advertisement is live.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Relaxed)
    }

    /// Local name of the last advertisement.
    pub fn last_name(&self) -> Option<String> {
        lock(&self.state.last_name).clone()
    }

    /// Notifications sent, with their timestamps.
    pub fn notifications(&self) -> Vec<(Instant, Vec<u8>)> {
        lock(&self.state.notifications).clone()
    }
}

#[async_trait]
impl Advertiser for MockAdvertiser {
    async fn advertise(&self, options: &PairingOptions) -> Result<Box<dyn AdvertisementHandle>> {
        self.state.advertise_calls.fetch_add(1, Ordering::Relaxed);
        if self.state.fail_advertise.load(Ordering::Relaxed) {
            return Err(Error::AdapterUnavailable(AdapterFault::PoweredOff));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.state.peer_tx) = Some(tx);
        *lock(&self.state.last_name) = Some(options.device_name.clone());
        self.state.active.store(true, Ordering::Relaxed);

        Ok(Box::new(MockAdvertisementHandle {
            state: self.state.clone(),
            peer_rx: rx,
            stopped: false,
        }))
    }
}

struct MockAdvertisementHandle {
    state: Arc<AdvertiserState>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    stopped: bool,
}

#[async_trait]
impl AdvertisementHandle for MockAdvertisementHandle {
    async fn next_peer_event(&mut self) -> Option<PeerEvent> {
        self.peer_rx.recv().await
    }

    async fn notify(&mut self, report: &[u8]) -> Result<()> {
        if self.state.fail_notify.load(Ordering::Relaxed) {
            return Err(Error::transport("mock-peer", "notification failed"));
        }
        lock(&self.state.notifications).push((Instant::now(), report.to_vec()));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.stop_calls.fetch_add(1, Ordering::Relaxed);
        if !self.stopped {
            self.stopped = true;
            self.state.active.store(false, Ordering::Relaxed);
            lock(&self.state.peer_tx).take();
        }
        Ok(())
    }
}
