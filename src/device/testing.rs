use std::cell::Cell;
use uuid::Uuid;

use crate::device::constants::{VACUUM_INBOUND_CHARACTERISTIC, VACUUM_OUTBOUND_CHARACTERISTIC, VACUUM_SERVICE};
use crate::device::platform::{BlePlatform, Capabilities, PlatformEvent};
use crate::device::types::{GattCharacteristic, GattService, LinkId, PeripheralHandle};
use crate::error::PlatformError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan(Uuid),
    StopScan,
    Connect(String),
    DiscoverServices,
    EnableNotifications(Uuid),
    Write(Uuid, Vec<u8>),
    Disconnect,
    Close,
}

/// Records every request; `reject_next` makes the next request fail synchronously.
#[derive(Debug, Default)]
pub struct FakePlatform {
    pub calls: Vec<Call>,
    pub reject_next: Option<PlatformError>,
}

impl FakePlatform {
    fn record(&mut self, call: Call) -> Result<(), PlatformError> {
        self.calls.push(call);
        match self.reject_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl BlePlatform for FakePlatform {
    fn start_scan(&mut self, service: Uuid) -> Result<(), PlatformError> {
        self.record(Call::StartScan(service))
    }

    fn stop_scan(&mut self) -> Result<(), PlatformError> {
        self.record(Call::StopScan)
    }

    fn connect(&mut self, _link: LinkId, peripheral: &PeripheralHandle) -> Result<(), PlatformError> {
        self.record(Call::Connect(peripheral.address.clone()))
    }

    fn discover_services(&mut self) -> Result<(), PlatformError> {
        self.record(Call::DiscoverServices)
    }

    fn enable_notifications(&mut self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        self.record(Call::EnableNotifications(characteristic.uuid))
    }

    fn write(&mut self, characteristic: &GattCharacteristic, value: &[u8]) -> Result<(), PlatformError> {
        self.record(Call::Write(characteristic.uuid, value.to_vec()))
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        self.record(Call::Disconnect)
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        self.record(Call::Close)
    }
}

#[derive(Debug)]
pub struct FakeCapabilities {
    pub radio: Cell<bool>,
    pub permission: Cell<bool>,
}

impl Default for FakeCapabilities {
    fn default() -> Self {
        FakeCapabilities {
            radio: Cell::new(true),
            permission: Cell::new(true),
        }
    }
}

impl Capabilities for FakeCapabilities {
    fn is_radio_enabled(&self) -> bool {
        self.radio.get()
    }

    fn has_permission(&self) -> bool {
        self.permission.get()
    }
}

pub fn handle(address: &str) -> PeripheralHandle {
    PeripheralHandle::new(format!("id-{}", address), Some("GIGA".to_string()), address)
}

pub fn vacuum_services() -> Vec<GattService> {
    let characteristic = |uuid| GattCharacteristic { service_uuid: VACUUM_SERVICE, uuid };

    vec![GattService {
        uuid: VACUUM_SERVICE,
        characteristics: vec![
            characteristic(VACUUM_OUTBOUND_CHARACTERISTIC),
            characteristic(VACUUM_INBOUND_CHARACTERISTIC),
        ],
    }]
}

pub fn status_payload(link: LinkId, raw: &str) -> PlatformEvent {
    PlatformEvent::CharacteristicChanged {
        link,
        uuid: VACUUM_INBOUND_CHARACTERISTIC,
        value: raw.as_bytes().to_vec(),
    }
}
