//! Core BLE library for the Android TV remote.
//!
//! This crate turns a computer into a Bluetooth Low Energy HID remote
//! control. It finds the TV, connects to it with retry and backoff, and sends
//! Consumer Control button presses; or, in pairing mode, advertises itself as
//! a remote and waits for the TV to connect.
//!
//! # Features
//!
//! - **Discovery**: multi-pass BLE scans with per-address deduplication
//! - **Ranking**: table-driven scoring that puts likely TVs first
//! - **Connecting**: bounded retries with exponential backoff that persists
//!   across calls
//! - **Commands**: press/release report pairs with a configurable gap
//! - **Pairing mode**: advertising state machine with timeout (BlueZ on Linux)
//! - **Events**: a broadcast channel of discovery, connection and pairing
//!   activity
//!
//! # Platform Differences
//!
//! - **macOS**: peripherals are identified by the UUID CoreBluetooth assigns,
//!   not by MAC address. The identifier is stable on one Mac only.
//! - **Linux/Windows**: peripherals are identified by MAC address.
//! - Pairing mode needs a peripheral-role backend; the crate ships
//!   `BluezAdvertiser` for Linux only.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tvremote_core::{BtleCentral, Button, RemoteService, ServiceConfig, UnsupportedAdvertiser};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let central = Arc::new(BtleCentral::new().await?);
//!     let service = RemoteService::new(
//!         central,
//!         Arc::new(UnsupportedAdvertiser),
//!         ServiceConfig::default(),
//!     )?;
//!
//!     let ranked = service.discover(Duration::from_secs(10), 3, false).await?;
//!     let Some(tv) = ranked.first() else {
//!         println!("No TV found");
//!         return Ok(());
//!     };
//!
//!     let session = service.connect_ranked(tv).await?;
//!     service.send_command(&session, Button::Home).await?;
//!     service.disconnect(&session).await?;
//!     Ok(())
//! }
//! ```

pub mod attempts;
pub mod backoff;
#[cfg(target_os = "linux")]
pub mod bluez;
pub mod btle;
pub mod connection;
pub mod error;
pub mod events;
pub mod mock;
pub mod pairing;
pub mod scan;
pub mod scoring;
pub mod service;
pub mod traits;
pub mod util;

// Re-export the shared types crate
pub use tvremote_types::types;
pub use tvremote_types::uuid;
pub use tvremote_types::{
    Button, DecodedReport, HidReport, HistoryEntry, PeripheralRecord, ReportSequencer, Sighting,
};

// Core exports
pub use attempts::{AttemptState, AttemptStore};
pub use backoff::BackoffPolicy;
#[cfg(target_os = "linux")]
pub use bluez::BluezAdvertiser;
pub use btle::{BtleCentral, BtleLink};
pub use connection::{ConnectOptions, ConnectionManager, Session};
pub use error::{AdapterFault, ConnectionFailureReason, Error, Result, is_retryable};
pub use events::{
    ConnectionEvent, DiscoveryEvent, EventDispatcher, EventReceiver, EventSender, PairingEvent,
    RemoteEvent,
};
pub use pairing::{
    AdvertisingController, PairingOptions, PairingSession, PairingState, UnsupportedAdvertiser,
};
pub use scan::{ScanOptions, Scanner, discover};
pub use scoring::{QualityScorer, RankOptions, RankedPeripheral, ScoringTable, rank, score};
pub use service::{RemoteService, ServiceConfig};
pub use traits::{AdvertisementHandle, Advertiser, Central, HidLink, PeerEvent};
