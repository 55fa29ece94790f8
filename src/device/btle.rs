use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use btleplug::api::{Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CLIENT_CHARACTERISTIC_CONFIGURATION, ENABLE_NOTIFICATION_VALUE};
use crate::device::platform::{BlePlatform, Capabilities, PlatformEvent};
use crate::device::types::{GattCharacteristic, GattService, LinkId, PeripheralHandle};
use crate::error::{DeviceError, PlatformError};

// Status codes carried by failed PlatformEvents
const SCAN_FAILED_INTERNAL_ERROR: i32 = 3;
const GATT_FAILURE: i32 = 0x101;

struct Flags {
    radio_enabled: AtomicBool,
    permission: AtomicBool,
}

fn note_error(flags: &Flags, err: &btleplug::Error) {
    if let btleplug::Error::PermissionDenied = err {
        warn!("Bluetooth permission was denied");
        flags.permission.store(false, Ordering::SeqCst);
    }
}

// Unknown is what CoreBluetooth reports before it has settled, so only an explicit PoweredOff
// counts as a disabled radio.
fn note_state(flags: &Flags, state: &CentralState) {
    let enabled = !matches!(state, CentralState::PoweredOff);
    if flags.radio_enabled.swap(enabled, Ordering::SeqCst) != enabled {
        info!("Bluetooth adapter state {:?}", state);
    }
}

fn send(events: &UnboundedSender<PlatformEvent>, event: PlatformEvent) {
    if events.unbounded_send(event).is_err() {
        debug!("Platform event dropped, session is gone");
    }
}

/// Capability answers for a btleplug host: the radio follows the adapter's power state, and
/// permission is withdrawn as soon as the OS rejects a call with `PermissionDenied`.
#[derive(Clone)]
pub struct BtleCapabilities {
    flags: Arc<Flags>,
}

impl Capabilities for BtleCapabilities {
    fn is_radio_enabled(&self) -> bool {
        self.flags.radio_enabled.load(Ordering::SeqCst)
    }

    fn has_permission(&self) -> bool {
        self.flags.permission.load(Ordering::SeqCst)
    }
}

struct Link {
    id: LinkId,
    peripheral: Peripheral,
    cancel: CancellationToken,
    characteristics: Arc<Mutex<HashMap<Uuid, Characteristic>>>,
}

impl Link {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, PlatformError> {
        self.characteristics
            .lock()
            .expect("Failed to lock characteristics")
            .get(&uuid)
            .cloned()
            .ok_or_else(|| PlatformError::Rejected(format!("unknown characteristic {}", uuid)))
    }
}

/// [`BlePlatform`] on top of btleplug. Every request is spawned on the tokio runtime and its
/// outcome is sent back as a [`PlatformEvent`].
pub struct BtlePlatform {
    _manager: Manager,
    runtime: Handle,
    adapter: Adapter,
    events: UnboundedSender<PlatformEvent>,
    flags: Arc<Flags>,
    known: Arc<Mutex<HashMap<String, Peripheral>>>,
    scan_cancel: Option<CancellationToken>,
    link: Option<Link>,
    watch_cancel: CancellationToken,
}

impl BtlePlatform {
    pub async fn new() -> Result<(BtlePlatform, BtleCapabilities, UnboundedReceiver<PlatformEvent>), DeviceError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?.into_iter().next().ok_or(DeviceError::NoAdapter)?;
        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let flags = Arc::new(Flags {
            radio_enabled: AtomicBool::new(true),
            permission: AtomicBool::new(true),
        });
        match adapter.adapter_state().await {
            Ok(state) => note_state(&flags, &state),
            Err(err) => warn!("Could not query adapter state: {:?}", err),
        }

        let (events, receiver) = unbounded();
        let watch_cancel = CancellationToken::new();
        watch_adapter_state(adapter.clone(), flags.clone(), watch_cancel.clone());

        let platform = BtlePlatform {
            _manager: manager,
            runtime: Handle::current(),
            adapter,
            events,
            flags: flags.clone(),
            known: Arc::new(Mutex::new(HashMap::new())),
            scan_cancel: None,
            link: None,
            watch_cancel,
        };

        Ok((platform, BtleCapabilities { flags }, receiver))
    }

    fn link(&self) -> Result<&Link, PlatformError> {
        self.link.as_ref().ok_or(PlatformError::NotConnected)
    }
}

impl Drop for BtlePlatform {
    fn drop(&mut self) {
        self.watch_cancel.cancel();
        if let Some(cancel) = self.scan_cancel.take() {
            cancel.cancel();
        }
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
    }
}

// Keeps the radio flag current for as long as the platform exists.
fn watch_adapter_state(adapter: Adapter, flags: Arc<Flags>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut central_events = match adapter.events().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Could not listen for adapter state: {:?}", err);
                note_error(&flags, &err);
                return;
            },
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = central_events.next() => match event {
                    Some(CentralEvent::StateUpdate(state)) => note_state(&flags, &state),
                    Some(_) => {},
                    None => break,
                },
            }
        }
    });
}

async fn advertisement(
    adapter: &Adapter,
    id: &PeripheralId,
    service: Uuid,
    known: &Mutex<HashMap<String, Peripheral>>,
) -> Option<PeripheralHandle> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            warn!("Could not look up peripheral {:?}: {:?}", id, err);
            return None;
        },
    };

    let properties: PeripheralProperties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => {
            debug!("Peripheral has no properties");
            return None;
        },
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            return None;
        },
    };

    // Some environments ignore the filter, so make sure to check the service uuid again
    if !properties.services.contains(&service) {
        return None;
    }

    let address = properties.address.to_string();
    debug!("Advertisement {} {:?} {:?}", address, properties.local_name, properties.rssi);

    let handle = PeripheralHandle::new(format!("{:?}", peripheral.id()), properties.local_name, address.clone());
    known.lock().expect("Failed to lock known peripherals").insert(address, peripheral);
    Some(handle)
}

impl BlePlatform for BtlePlatform {
    fn start_scan(&mut self, service: Uuid) -> Result<(), PlatformError> {
        if let Some(previous) = self.scan_cancel.take() {
            previous.cancel();
        }

        let cancel = CancellationToken::new();
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let flags = self.flags.clone();
        let known = self.known.clone();
        let scan_cancel = cancel.clone();

        self.runtime.spawn(async move {
            let mut central_events = match adapter.events().await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Could not listen for adapter events: {:?}", err);
                    note_error(&flags, &err);
                    send(&events, PlatformEvent::ScanFailed(SCAN_FAILED_INTERNAL_ERROR));
                    return;
                },
            };

            if let Err(err) = adapter.start_scan(ScanFilter { services: vec![service] }).await {
                warn!("Scanning failed {:?}", err);
                note_error(&flags, &err);
                send(&events, PlatformEvent::ScanFailed(SCAN_FAILED_INTERNAL_ERROR));
                return;
            }

            'scanloop: loop {
                tokio::select! {
                    _ = scan_cancel.cancelled() => {
                        break 'scanloop;
                    },
                    event = central_events.next() => match event {
                        Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                            if let Some(handle) = advertisement(&adapter, &id, service, &known).await {
                                send(&events, PlatformEvent::Advertisement(handle));
                            }
                        },
                        Some(_) => {},
                        None => break 'scanloop,
                    },
                }
            }

            if let Err(err) = adapter.stop_scan().await {
                debug!("Failed to stop scan: {:?}", err);
            }
        });

        self.scan_cancel = Some(cancel);
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), PlatformError> {
        if let Some(cancel) = self.scan_cancel.take() {
            cancel.cancel();
        }
        Ok(())
    }

    fn connect(&mut self, link: LinkId, peripheral: &PeripheralHandle) -> Result<(), PlatformError> {
        let target = self.known
            .lock()
            .expect("Failed to lock known peripherals")
            .get(&peripheral.address)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownPeripheral(peripheral.address.clone()))?;

        if let Some(previous) = self.link.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let flags = self.flags.clone();
        let link_cancel = cancel.clone();
        let link_peripheral = target.clone();

        self.runtime.spawn(async move {
            let mut central_events = match adapter.events().await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Could not listen for adapter events: {:?}", err);
                    note_error(&flags, &err);
                    send(&events, PlatformEvent::ConnectionStateChange { link, connected: false });
                    return;
                },
            };

            if let Err(err) = link_peripheral.connect().await {
                warn!("Connecting to peripheral failed: {:?}", err);
                note_error(&flags, &err);
                if !link_cancel.is_cancelled() {
                    send(&events, PlatformEvent::ConnectionStateChange { link, connected: false });
                }
                return;
            }

            if link_cancel.is_cancelled() {
                return;
            }
            send(&events, PlatformEvent::ConnectionStateChange { link, connected: true });

            let id = link_peripheral.id();
            'linkloop: loop {
                tokio::select! {
                    _ = link_cancel.cancelled() => {
                        break 'linkloop;
                    },
                    event = central_events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(disconnected)) if disconnected == id => {
                            send(&events, PlatformEvent::ConnectionStateChange { link, connected: false });
                            break 'linkloop;
                        },
                        Some(_) => {},
                        None => break 'linkloop,
                    },
                }
            }
        });

        self.link = Some(Link {
            id: link,
            peripheral: target,
            cancel,
            characteristics: Arc::new(Mutex::new(HashMap::new())),
        });
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), PlatformError> {
        let link = self.link()?;
        let id = link.id;
        let peripheral = link.peripheral.clone();
        let characteristics = link.characteristics.clone();
        let link_cancel = link.cancel.clone();
        let events = self.events.clone();
        let flags = self.flags.clone();

        self.runtime.spawn(async move {
            let discovered = peripheral.discover_services().await;
            if link_cancel.is_cancelled() {
                debug!("Dropping discovery result for closed link {:?}", id);
                return;
            }

            if let Err(err) = discovered {
                warn!("Service discovery failed: {:?}", err);
                note_error(&flags, &err);
                send(&events, PlatformEvent::ServicesDiscovered(id, Err(GATT_FAILURE)));
                return;
            }

            let services: Vec<GattService> = {
                let mut known = characteristics.lock().expect("Failed to lock characteristics");
                peripheral.services().iter().map(|service| GattService {
                    uuid: service.uuid,
                    characteristics: service.characteristics.iter().map(|characteristic| {
                        known.insert(characteristic.uuid, characteristic.clone());
                        GattCharacteristic { service_uuid: service.uuid, uuid: characteristic.uuid }
                    }).collect(),
                }).collect()
            };

            send(&events, PlatformEvent::ServicesDiscovered(id, Ok(services)));
        });

        Ok(())
    }

    fn enable_notifications(&mut self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        let link = self.link()?;
        let target = link.characteristic(characteristic.uuid)?;
        let id = link.id;
        let peripheral = link.peripheral.clone();
        let link_cancel = link.cancel.clone();
        let events = self.events.clone();
        let flags = self.flags.clone();

        self.runtime.spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Could not open notification stream: {:?}", err);
                    note_error(&flags, &err);
                    send(&events, PlatformEvent::DescriptorWrite { link: id, success: false });
                    return;
                },
            };

            debug!(
                "Subscribing to {}; btleplug writes {:02x?} to its descriptor {}",
                target.uuid, ENABLE_NOTIFICATION_VALUE, CLIENT_CHARACTERISTIC_CONFIGURATION,
            );
            let subscribed = peripheral.subscribe(&target).await;
            if link_cancel.is_cancelled() {
                return;
            }
            if let Err(err) = subscribed {
                warn!("Subscribing to {} failed: {:?}", target.uuid, err);
                note_error(&flags, &err);
                send(&events, PlatformEvent::DescriptorWrite { link: id, success: false });
                return;
            }
            send(&events, PlatformEvent::DescriptorWrite { link: id, success: true });

            'notifyloop: loop {
                tokio::select! {
                    _ = link_cancel.cancelled() => {
                        break 'notifyloop;
                    },
                    notification = notifications.next() => match notification {
                        Some(data) => send(&events, PlatformEvent::CharacteristicChanged { link: id, uuid: data.uuid, value: data.value }),
                        None => break 'notifyloop,
                    },
                }
            }
        });

        Ok(())
    }

    fn write(&mut self, characteristic: &GattCharacteristic, value: &[u8]) -> Result<(), PlatformError> {
        let link = self.link()?;
        let target = link.characteristic(characteristic.uuid)?;
        let id = link.id;
        let peripheral = link.peripheral.clone();
        let link_cancel = link.cancel.clone();
        let events = self.events.clone();
        let flags = self.flags.clone();
        let value = value.to_vec();

        self.runtime.spawn(async move {
            let result = peripheral.write(&target, &value, WriteType::WithResponse).await;
            if link_cancel.is_cancelled() {
                debug!("Dropping write result for closed link {:?}", id);
                return;
            }
            if let Err(err) = &result {
                warn!("Failed to send to characteristic {}: {:?}", target.uuid, err);
                note_error(&flags, err);
            }
            send(&events, PlatformEvent::CharacteristicWrite { link: id, uuid: target.uuid, success: result.is_ok() });
        });

        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        let peripheral = self.link()?.peripheral.clone();

        self.runtime.spawn(async move {
            if let Err(err) = peripheral.disconnect().await {
                debug!("Failed to disconnect: {:?}", err);
            }
        });

        Ok(())
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
        Ok(())
    }
}
