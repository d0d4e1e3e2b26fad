//! Pairing-mode backend for Linux: a HID-over-GATT peripheral served
//! through BlueZ.
//!
//! The GATT application carries the HID service (information, report map,
//! control point, protocol mode and one input report) and a Device
//! Information service. A TV subscribing to input reports is treated as the
//! peer connecting; the end of that subscription as the peer leaving.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle as BluezAdvertisement};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, Descriptor,
    DescriptorRead, DescriptorReadRequest, Service,
};
use bluer::{Adapter, Address, Session};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use tvremote_types::hid::{HID_INFORMATION, REPORT_DESCRIPTOR, REPORT_ID};
use tvremote_types::uuids;

use crate::error::{AdapterFault, Error, Result};
use crate::pairing::PairingOptions;
use crate::traits::{AdvertisementHandle, Advertiser, PeerEvent};

/// Report Reference value: report ID, input report.
const REPORT_REFERENCE_VALUE: [u8; 2] = [REPORT_ID, 0x01];

/// Protocol Mode value for report protocol.
const REPORT_PROTOCOL: u8 = 0x01;

fn bluez_fault(error: bluer::Error) -> Error {
    Error::AdapterUnavailable(AdapterFault::Other(error.to_string()))
}

/// Strip the report ID: HID-over-GATT carries it in the Report Reference
/// descriptor, not in the notification.
fn report_payload(report: &[u8]) -> Result<&[u8]> {
    match report.split_first() {
        Some((&REPORT_ID, payload)) => Ok(payload),
        _ => Err(Error::transport(
            "pairing-peer",
            format!("not an input report: {:02X?}", report),
        )),
    }
}

fn read_offset(value: &[u8], offset: u16) -> Vec<u8> {
    value.get(usize::from(offset)..).unwrap_or_default().to_vec()
}

fn static_read(value: Vec<u8>) -> CharacteristicRead {
    let value = Arc::new(value);
    CharacteristicRead {
        read: true,
        fun: Box::new(move |req: CharacteristicReadRequest| {
            let value = value.clone();
            Box::pin(async move { Ok(read_offset(&value, req.offset)) })
        }),
        ..Default::default()
    }
}

fn ignored_write(label: &'static str) -> CharacteristicWrite {
    CharacteristicWrite {
        write_without_response: true,
        method: CharacteristicWriteMethod::Fun(Box::new(
            move |data: Vec<u8>, _req: CharacteristicWriteRequest| {
                Box::pin(async move {
                    debug!("{} write: {:02X?}", label, data);
                    Ok(())
                })
            },
        )),
        ..Default::default()
    }
}

/// [`Advertiser`] backed by the BlueZ daemon.
pub struct BluezAdvertiser {
    _session: Session,
    adapter: Adapter,
}

impl BluezAdvertiser {
    /// Connect to BlueZ and power on the default adapter.
    pub async fn new() -> Result<Self> {
        let session = Session::new().await.map_err(bluez_fault)?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| Error::AdapterUnavailable(AdapterFault::NoAdapter))?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await.map_err(bluez_fault)? {
            info!("Powering on Bluetooth adapter...");
            adapter
                .set_powered(true)
                .await
                .map_err(|_| Error::AdapterUnavailable(AdapterFault::PoweredOff))?;
        }

        Ok(Self {
            _session: session,
            adapter,
        })
    }

    fn application(options: &PairingOptions, link: ReportLink) -> Application {
        let report = Characteristic {
            uuid: uuids::HID_REPORT,
            read: Some(static_read(vec![0x00, 0x00])),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                    let link = link.clone();
                    Box::pin(async move {
                        let address = link.peer_address().await;
                        info!("TV subscribed to input reports: {:?}", address);
                        let _ = link.peers.send(PeerEvent::Connected { address });

                        loop {
                            let payload = tokio::select! {
                                _ = notifier.stopped() => break,
                                payload = async { link.reports.lock().await.recv().await } => payload,
                            };
                            let Some(payload) = payload else {
                                debug!("Report channel closed");
                                break;
                            };
                            if let Err(e) = notifier.notify(payload).await {
                                warn!("Failed to notify report: {}", e);
                                break;
                            }
                        }

                        info!("TV unsubscribed from input reports");
                        let _ = link.peers.send(PeerEvent::Disconnected);
                    })
                })),
                ..Default::default()
            }),
            descriptors: vec![Descriptor {
                uuid: uuids::REPORT_REFERENCE,
                read: Some(DescriptorRead {
                    read: true,
                    fun: Box::new(|_req: DescriptorReadRequest| {
                        Box::pin(async { Ok(REPORT_REFERENCE_VALUE.to_vec()) })
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        let hid = Service {
            uuid: uuids::HID_SERVICE,
            primary: true,
            characteristics: vec![
                Characteristic {
                    uuid: uuids::HID_INFORMATION,
                    read: Some(static_read(HID_INFORMATION.to_vec())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: uuids::HID_REPORT_MAP,
                    read: Some(static_read(REPORT_DESCRIPTOR.to_vec())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: uuids::HID_CONTROL_POINT,
                    write: Some(ignored_write("Control point")),
                    ..Default::default()
                },
                Characteristic {
                    uuid: uuids::HID_PROTOCOL_MODE,
                    read: Some(static_read(vec![REPORT_PROTOCOL])),
                    write: Some(ignored_write("Protocol mode")),
                    ..Default::default()
                },
                report,
            ],
            ..Default::default()
        };

        let device_info = Service {
            uuid: uuids::DEVICE_INFO_SERVICE,
            primary: true,
            characteristics: vec![
                Characteristic {
                    uuid: uuids::MANUFACTURER_NAME,
                    read: Some(static_read(options.manufacturer.clone().into_bytes())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: uuids::MODEL_NUMBER,
                    read: Some(static_read(options.model.clone().into_bytes())),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        Application {
            services: vec![hid, device_info],
            ..Default::default()
        }
    }
}

#[async_trait]
impl Advertiser for BluezAdvertiser {
    async fn advertise(&self, options: &PairingOptions) -> Result<Box<dyn AdvertisementHandle>> {
        self.adapter
            .set_alias(options.device_name.clone())
            .await
            .map_err(bluez_fault)?;

        // Centrals connected before pairing started are not the TV.
        let ignore = connected_devices(&self.adapter).await;
        let (report_tx, report_rx) = mpsc::channel(16);
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let link = ReportLink {
            adapter: self.adapter.clone(),
            ignore: Arc::new(ignore),
            reports: Arc::new(Mutex::new(report_rx)),
            peers: peer_tx,
        };

        let app = self
            .adapter
            .serve_gatt_application(Self::application(options, link))
            .await
            .map_err(bluez_fault)?;

        let adv = Advertisement {
            service_uuids: vec![uuids::HID_SERVICE].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(options.device_name.clone()),
            appearance: Some(uuids::APPEARANCE_REMOTE_CONTROL),
            ..Default::default()
        };
        let adv = self.adapter.advertise(adv).await.map_err(bluez_fault)?;
        info!("Advertising HID service as '{}'", options.device_name);

        Ok(Box::new(BluezHandle {
            adv: Some(adv),
            app: Some(app),
            reports: Some(report_tx),
            peer_rx,
        }))
    }
}

async fn connected_devices(adapter: &Adapter) -> HashSet<Address> {
    let mut connected = HashSet::new();
    let addresses = match adapter.device_addresses().await {
        Ok(addresses) => addresses,
        Err(e) => {
            debug!("Failed to list devices: {}", e);
            return connected;
        }
    };
    for addr in addresses {
        if let Ok(device) = adapter.device(addr)
            && device.is_connected().await.unwrap_or(false)
        {
            connected.insert(addr);
        }
    }
    connected
}

/// State shared with the Report characteristic's notify callback.
#[derive(Clone)]
struct ReportLink {
    adapter: Adapter,
    ignore: Arc<HashSet<Address>>,
    reports: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    peers: mpsc::UnboundedSender<PeerEvent>,
}

impl ReportLink {
    /// Address of the central that just subscribed, if it can be told apart.
    async fn peer_address(&self) -> Option<String> {
        connected_devices(&self.adapter)
            .await
            .difference(&self.ignore)
            .next()
            .map(|addr| addr.to_string())
    }
}

struct BluezHandle {
    adv: Option<BluezAdvertisement>,
    app: Option<ApplicationHandle>,
    reports: Option<mpsc::Sender<Vec<u8>>>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
}

#[async_trait]
impl AdvertisementHandle for BluezHandle {
    async fn next_peer_event(&mut self) -> Option<PeerEvent> {
        self.peer_rx.recv().await
    }

    async fn notify(&mut self, report: &[u8]) -> Result<()> {
        let payload = report_payload(report)?.to_vec();
        let Some(reports) = &self.reports else {
            return Err(Error::transport("pairing-peer", "advertising stopped"));
        };
        reports
            .send(payload)
            .await
            .map_err(|_| Error::transport("pairing-peer", "report channel closed"))
    }

    async fn stop(&mut self) -> Result<()> {
        self.reports = None;
        if self.adv.take().is_some() {
            info!("Advertising stopped");
        }
        // Dropping the handle unregisters the application.
        self.app = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_payload_strips_id() {
        assert_eq!(report_payload(&[REPORT_ID, 0xE9, 0x00]).unwrap(), &[0xE9, 0x00]);
        assert!(report_payload(&[0x02, 0xE9, 0x00]).is_err());
        assert!(report_payload(&[]).is_err());
    }

    #[test]
    fn test_read_offset() {
        assert_eq!(read_offset(&REPORT_DESCRIPTOR, 0).len(), REPORT_DESCRIPTOR.len());
        assert_eq!(read_offset(&REPORT_DESCRIPTOR, 23), vec![0x00, 0xC0]);
        assert!(read_offset(&REPORT_DESCRIPTOR, 100).is_empty());
    }
}
