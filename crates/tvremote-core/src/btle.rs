//! Central backend built on btleplug.
//!
//! [`BtleCentral`] scans for peripherals and opens [`BtleLink`]s that write
//! HID reports to a TV's Report characteristic.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use tvremote_types::{Sighting, uuids};

use crate::error::{AdapterFault, ConnectionFailureReason, Error, Result};
use crate::traits::{Central, HidLink};
use crate::util::{create_identifier, format_peripheral_id, same_address};

/// Length of the scan run when connecting to an address the adapter has not
/// seen yet.
pub const LOOKUP_SCAN_DURATION: Duration = Duration::from_secs(5);

fn adapter_fault(error: btleplug::Error) -> Error {
    match error {
        btleplug::Error::PermissionDenied => Error::AdapterUnavailable(AdapterFault::PermissionDenied),
        other => Error::AdapterUnavailable(AdapterFault::Other(other.to_string())),
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await.map_err(adapter_fault)?;
    let adapters = manager.adapters().await.map_err(adapter_fault)?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::AdapterUnavailable(AdapterFault::NoAdapter))
}

/// [`Central`] implementation over a btleplug adapter.
#[derive(Debug, Clone)]
pub struct BtleCentral {
    adapter: Adapter,
}

impl BtleCentral {
    /// Open the first Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::from_adapter(get_adapter().await?))
    }

    /// Wrap an adapter that is already open.
    pub fn from_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn ensure_powered(&self) -> Result<()> {
        match self.adapter.adapter_state().await {
            Ok(CentralState::PoweredOff) => Err(Error::AdapterUnavailable(AdapterFault::PoweredOff)),
            Ok(_) => Ok(()),
            Err(e) => {
                debug!("Could not query adapter state: {}", e);
                Ok(())
            }
        }
    }

    async fn sighting(&self, peripheral: &Peripheral) -> Result<Option<Sighting>> {
        let Some(properties) = peripheral.properties().await? else {
            return Ok(None);
        };
        let address = create_identifier(&properties.address.to_string(), &peripheral.id());
        Ok(Some(Sighting::new(
            address,
            properties.local_name,
            properties.rssi,
        )))
    }

    /// Search the adapter's known peripherals for `address`.
    async fn find_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if same_address(address, &format_peripheral_id(&peripheral.id())) {
                debug!("Matched by peripheral ID");
                return Ok(Some(peripheral));
            }
            if let Ok(Some(props)) = peripheral.properties().await
                && same_address(address, &props.address.to_string())
            {
                debug!("Matched by address: {}", props.address);
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Central for BtleCentral {
    async fn scan_pass(&self, duration: Duration) -> Result<Vec<Sighting>> {
        self.ensure_powered().await?;

        let mut events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(adapter_fault)?;
        debug!("Scanning for {:?}", duration);

        let mut seen = HashSet::new();
        let deadline = sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(CentralEvent::DeviceDiscovered(id))
                    | Some(CentralEvent::DeviceUpdated(id)) => {
                        seen.insert(id);
                    }
                    Some(_) => {}
                    None => {
                        // Stream ended early; still honour the pass length.
                        (&mut deadline).await;
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        let mut sightings = Vec::with_capacity(seen.len());
        for id in seen {
            let peripheral = match self.adapter.peripheral(&id).await {
                Ok(p) => p,
                Err(e) => {
                    debug!("Peripheral vanished before it could be read: {}", e);
                    continue;
                }
            };
            match self.sighting(&peripheral).await {
                Ok(Some(sighting)) => sightings.push(sighting),
                Ok(None) => {}
                Err(e) => debug!("Error reading peripheral properties: {}", e),
            }
        }

        debug!("Pass saw {} peripheral(s)", sightings.len());
        Ok(sightings)
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self, address: &str) -> Result<Arc<dyn HidLink>> {
        self.ensure_powered().await?;

        let peripheral = match self.find_peripheral(address).await? {
            Some(p) => p,
            None => {
                info!("{} not cached, scanning for it", address);
                self.scan_pass(LOOKUP_SCAN_DURATION).await?;
                self.find_peripheral(address)
                    .await?
                    .ok_or_else(|| Error::attempt_failed(address, ConnectionFailureReason::NotFound))?
            }
        };

        info!("Connecting...");
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let services = peripheral.services();
        debug!("Found {} services", services.len());

        let Some(characteristic) = find_report_characteristic(&services) else {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect after unsupported device failed: {}", e);
            }
            return Err(Error::attempt_failed(
                address,
                ConnectionFailureReason::UnsupportedDevice,
            ));
        };

        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        info!("Connected, writing reports to {}", characteristic.uuid);

        Ok(Arc::new(BtleLink {
            address: address.to_string(),
            peripheral,
            characteristic,
            write_type,
        }))
    }
}

fn is_writable(characteristic: &Characteristic) -> bool {
    characteristic
        .properties
        .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
}

/// Pick the characteristic HID reports are written to.
///
/// Prefers a writable Report characteristic inside the HID service and falls
/// back to the first writable characteristic anywhere.
pub fn find_report_characteristic(services: &BTreeSet<Service>) -> Option<Characteristic> {
    let hid_report = services
        .iter()
        .filter(|s| s.uuid == uuids::HID_SERVICE)
        .flat_map(|s| s.characteristics.iter())
        .find(|c| c.uuid == uuids::HID_REPORT && is_writable(c));

    hid_report
        .or_else(|| {
            services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .find(|c| is_writable(c))
        })
        .cloned()
}

/// An open connection to a TV.
#[derive(Debug)]
pub struct BtleLink {
    address: String,
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
}

#[async_trait]
impl HidLink for BtleLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write_report(&self, report: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, report, self.write_type)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.address);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
