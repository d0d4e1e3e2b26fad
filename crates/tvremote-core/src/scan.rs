//! Peripheral discovery.
//!
//! A discovery session runs a number of sequential scan passes over a
//! [`Central`] and merges every sighting into one [`PeripheralRecord`] per
//! address. Passes are short because TVs advertise intermittently; running a
//! few of them with a pause in between finds more devices than one long scan.

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tvremote_types::{PeripheralRecord, Sighting};

use crate::error::{Error, Result, is_retryable};
use crate::events::{DiscoveryEvent, EventDispatcher};
use crate::traits::Central;
use crate::util::normalize_address;

/// Extra time a pass may take beyond its listening window (stopping the scan,
/// collecting properties) before it is abandoned.
pub const PASS_OVERRUN: Duration = Duration::from_secs(5);

/// Options for a discovery session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// How long each pass listens for advertisements.
    pub pass_timeout: Duration,
    /// Number of passes; 0 is treated as 1.
    pub retry_count: u32,
    /// Pause after a pass that found something.
    pub settle_pause: Duration,
    /// Pause after a pass that found nothing.
    pub empty_pass_pause: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(10),
            retry_count: 3,
            settle_pause: Duration::from_secs(2),
            empty_pass_pause: Duration::from_secs(5),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listening window of each pass.
    #[must_use]
    pub fn pass_timeout(mut self, duration: Duration) -> Self {
        self.pass_timeout = duration;
        self
    }

    /// Set the listening window in seconds.
    #[must_use]
    pub fn pass_timeout_secs(mut self, secs: u64) -> Self {
        self.pass_timeout = Duration::from_secs(secs);
        self
    }

    /// Set the number of passes.
    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the pause after a productive pass.
    #[must_use]
    pub fn settle_pause(mut self, pause: Duration) -> Self {
        self.settle_pause = pause;
        self
    }

    /// Set the pause after an empty pass.
    #[must_use]
    pub fn empty_pass_pause(mut self, pause: Duration) -> Self {
        self.empty_pass_pause = pause;
        self
    }

    /// Number of passes that will actually run.
    pub fn passes(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.pass_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "pass_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs discovery sessions against a central backend.
pub struct Scanner<'a, C: Central + ?Sized> {
    central: &'a C,
    options: ScanOptions,
    events: Option<EventDispatcher>,
    cancel: Option<CancellationToken>,
}

impl<'a, C: Central + ?Sized> Scanner<'a, C> {
    /// Create a scanner over `central`.
    pub fn new(central: &'a C, options: ScanOptions) -> Self {
        Self {
            central,
            options,
            events: None,
            cancel: None,
        }
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// Abort with [`Error::Cancelled`] when `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Options in use.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Run one discovery session.
    ///
    /// Records are returned in order of first sighting.
    #[tracing::instrument(level = "info", skip_all, fields(passes = self.options.passes()))]
    pub async fn discover(&self) -> Result<Vec<PeripheralRecord>> {
        self.options.validate()?;

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!("Discovery cancelled");
                        Err(Error::Cancelled)
                    }
                    result = self.run_passes() => result,
                }
            }
            None => self.run_passes().await,
        }
    }

    async fn run_passes(&self) -> Result<Vec<PeripheralRecord>> {
        let passes = self.options.passes();
        let guard = self.options.pass_timeout + PASS_OVERRUN;

        let mut session = DiscoverySession::default();
        let mut any_succeeded = false;
        let mut last_error = None;

        for pass in 1..=passes {
            self.emit(DiscoveryEvent::PassStarted { pass, of: passes });
            info!(
                "Discovery pass {}/{} ({}s)...",
                pass,
                passes,
                self.options.pass_timeout.as_secs()
            );

            let found = match timeout(guard, self.central.scan_pass(self.options.pass_timeout))
                .await
            {
                Ok(Ok(sightings)) => {
                    any_succeeded = true;
                    let (valid, new_peripherals) = session.merge(sightings, pass);
                    debug!(
                        "Pass {} saw {} advertisement(s), {} new peripheral(s)",
                        pass, valid, new_peripherals
                    );
                    self.emit(DiscoveryEvent::PassCompleted {
                        pass,
                        sightings: valid,
                        new_peripherals,
                    });
                    valid
                }
                Ok(Err(e @ Error::AdapterUnavailable(_))) => {
                    warn!("Adapter unavailable, aborting discovery: {}", e);
                    return Err(e);
                }
                Ok(Err(e)) if is_retryable(&e) => {
                    warn!("Discovery pass {} failed: {}", pass, e);
                    self.emit(DiscoveryEvent::PassFailed {
                        pass,
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                    0
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    let e = Error::timeout("scan_pass", guard);
                    warn!("Discovery pass {} timed out", pass);
                    self.emit(DiscoveryEvent::PassFailed {
                        pass,
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                    0
                }
            };

            if pass < passes {
                let pause = if found == 0 {
                    self.options.empty_pass_pause
                } else {
                    self.options.settle_pause
                };
                debug!("Pausing {:?} before next pass", pause);
                sleep(pause).await;
            }
        }

        if !any_succeeded && let Some(e) = last_error {
            return Err(e);
        }

        let records = session.into_records();
        info!("Discovery complete. Found {} peripheral(s)", records.len());
        self.emit(DiscoveryEvent::Finished {
            peripherals: records.len(),
        });
        Ok(records)
    }

    fn emit(&self, event: DiscoveryEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

/// Run a discovery session with default pauses.
pub async fn discover<C: Central + ?Sized>(
    central: &C,
    pass_timeout: Duration,
    retry_count: u32,
) -> Result<Vec<PeripheralRecord>> {
    let options = ScanOptions::default()
        .pass_timeout(pass_timeout)
        .retry_count(retry_count);
    Scanner::new(central, options).discover().await
}

/// Deduplicated records of one discovery session.
#[derive(Debug, Default)]
struct DiscoverySession {
    records: Vec<PeripheralRecord>,
    by_address: HashMap<String, usize>,
}

impl DiscoverySession {
    /// Merge one pass; returns (valid sightings, new peripherals).
    fn merge(&mut self, sightings: Vec<Sighting>, pass: u32) -> (usize, usize) {
        let now = OffsetDateTime::now_utc();
        let mut valid = 0;
        let mut new_peripherals = 0;

        for mut sighting in sightings {
            let address = normalize_address(&sighting.address);
            if address.is_empty() {
                continue;
            }
            sighting.address = address;
            valid += 1;

            match self.by_address.get(&sighting.address) {
                Some(&index) => self.records[index].observe(sighting, now),
                None => {
                    self.by_address
                        .insert(sighting.address.clone(), self.records.len());
                    self.records
                        .push(PeripheralRecord::from_sighting(sighting, now, pass));
                    new_peripherals += 1;
                }
            }
        }

        (valid, new_peripherals)
    }

    fn into_records(self) -> Vec<PeripheralRecord> {
        self.records
    }
}
