//! The seam between the session and the host Bluetooth stack.
//!
//! Every [`BlePlatform`] call is fire-and-forget: it only reports whether the request was
//! accepted. Outcomes come back later as [`PlatformEvent`]s, which the owner of the session
//! feeds to [`crate::device::session::Session::handle_platform_event`] one at a time.

use uuid::Uuid;

use crate::device::types::{GattCharacteristic, GattService, LinkId, PeripheralHandle};
use crate::error::PlatformError;

/// Queried before every radio operation. Answers may change between calls.
pub trait Capabilities {
    fn is_radio_enabled(&self) -> bool;
    fn has_permission(&self) -> bool;
}

pub trait BlePlatform {
    fn start_scan(&mut self, service: Uuid) -> Result<(), PlatformError>;
    fn stop_scan(&mut self) -> Result<(), PlatformError>;
    /// Opens a connection. Events for it must be tagged with `link`.
    fn connect(&mut self, link: LinkId, peripheral: &PeripheralHandle) -> Result<(), PlatformError>;
    fn discover_services(&mut self) -> Result<(), PlatformError>;
    /// Turns on notifications for the characteristic and writes the CCCD enable value.
    fn enable_notifications(&mut self, characteristic: &GattCharacteristic) -> Result<(), PlatformError>;
    fn write(&mut self, characteristic: &GattCharacteristic, value: &[u8]) -> Result<(), PlatformError>;
    fn disconnect(&mut self) -> Result<(), PlatformError>;
    /// Releases the connection object. No events are delivered for it afterwards.
    fn close(&mut self) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Advertisement(PeripheralHandle),
    ScanFailed(i32),
    ConnectionStateChange { link: LinkId, connected: bool },
    /// `Err` carries the platform status when discovery did not complete.
    ServicesDiscovered(LinkId, Result<Vec<GattService>, i32>),
    CharacteristicChanged { link: LinkId, uuid: Uuid, value: Vec<u8> },
    DescriptorWrite { link: LinkId, success: bool },
    CharacteristicWrite { link: LinkId, uuid: Uuid, success: bool },
}

impl PlatformEvent {
    /// The connection the event belongs to, `None` for scan events.
    pub fn link(&self) -> Option<LinkId> {
        match self {
            PlatformEvent::Advertisement(_) | PlatformEvent::ScanFailed(_) => None,
            PlatformEvent::ConnectionStateChange { link, .. }
            | PlatformEvent::ServicesDiscovered(link, _)
            | PlatformEvent::CharacteristicChanged { link, .. }
            | PlatformEvent::DescriptorWrite { link, .. }
            | PlatformEvent::CharacteristicWrite { link, .. } => Some(*link),
        }
    }
}
