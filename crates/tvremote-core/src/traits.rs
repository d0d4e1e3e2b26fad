//! Trait abstractions over the Bluetooth stack.
//!
//! The remote plays two roles. As a *central* it scans for TVs and writes
//! HID reports to one of them ([`Central`], [`HidLink`]). As a *peripheral* it
//! advertises itself as a HID remote and waits for the TV to connect
//! ([`Advertiser`], [`AdvertisementHandle`]).
//!
//! Real backends live in [`crate::btle`] (btleplug) and, on Linux,
//! `crate::bluez` (BlueZ via bluer). [`crate::mock`] provides in-memory
//! implementations for tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tvremote_types::Sighting;

use crate::error::Result;
use crate::pairing::PairingOptions;

/// Central-role access to the Bluetooth adapter.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tvremote_core::{Central, Result};
///
/// async fn count_nearby<C: Central>(central: &C) -> Result<usize> {
///     let sightings = central.scan_pass(Duration::from_secs(5)).await?;
///     Ok(sightings.len())
/// }
/// ```
#[async_trait]
pub trait Central: Send + Sync {
    /// Scan for `duration` and return every advertisement seen.
    ///
    /// Adapter-level faults must be reported as
    /// [`crate::Error::AdapterUnavailable`] so discovery can stop early.
    async fn scan_pass(&self, duration: Duration) -> Result<Vec<Sighting>>;

    /// Make one connection attempt to the peripheral at `address`.
    ///
    /// Retrying is the caller's job.
    async fn connect(&self, address: &str) -> Result<Arc<dyn HidLink>>;
}

/// An open connection to a peripheral that accepts HID reports.
#[async_trait]
pub trait HidLink: Send + Sync + fmt::Debug {
    /// Address of the connected peripheral.
    fn address(&self) -> &str;

    /// Whether the link is still up.
    async fn is_connected(&self) -> bool;

    /// Write one encoded report.
    async fn write_report(&self, report: &[u8]) -> Result<()>;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;
}

/// Peripheral-role access: makes this machine discoverable as a remote.
#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Register the HID service and start advertising.
    async fn advertise(&self, options: &PairingOptions) -> Result<Box<dyn AdvertisementHandle>>;
}

/// Connection changes reported by a running advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A TV connected and subscribed to input reports.
    Connected {
        /// Address of the TV, when the stack reports one.
        address: Option<String>,
    },
    /// The TV went away.
    Disconnected,
}

/// A live advertisement plus its GATT application.
///
/// Owned by exactly one task; [`AdvertisementHandle::stop`] is called once
/// when that task exits.
#[async_trait]
pub trait AdvertisementHandle: Send {
    /// Wait for the next peer event. `None` means the backend went away.
    ///
    /// Must be cancel safe: it is polled inside `tokio::select!`.
    async fn next_peer_event(&mut self) -> Option<PeerEvent>;

    /// Send one report to the connected peer as a notification.
    async fn notify(&mut self, report: &[u8]) -> Result<()>;

    /// Tear down the advertisement and the GATT application.
    async fn stop(&mut self) -> Result<()>;
}
