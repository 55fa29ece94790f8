use std::fmt;
use uuid::Uuid;

use crate::device::constants::{COMMAND_LEVEL_DOWN, COMMAND_LEVEL_UP, COMMAND_POWER_OFF, COMMAND_POWER_ON, COMMAND_STATUS};
use crate::device::status::VacuumState;
use crate::error::SessionError;

/// Numbers one GATT connection attempt. Every connection scoped platform callback carries the
/// number of the connection it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkId(pub u64);

impl LinkId {
    pub fn next(self) -> LinkId {
        LinkId(self.0.wrapping_add(1))
    }
}

/// A peripheral seen during a scan. Two handles are the same peripheral when their addresses match.
#[derive(Debug, Clone, Eq)]
pub struct PeripheralHandle {
    /// Opaque platform identifier, used by the platform to find the peripheral again.
    pub id: String,
    /// Advertised name; the OS may hide it without the connect permission.
    pub name: Option<String>,
    pub address: String,
}

impl PeripheralHandle {
    pub fn new(id: impl Into<String>, name: Option<String>, address: impl Into<String>) -> Self {
        PeripheralHandle {
            id: id.into(),
            name,
            address: address.into(),
        }
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    SubscribingNotifications,
    Ready,
    Disconnecting,
    Disconnected,
}

impl SessionState {
    /// True while a GATT connection is being set up or is in use.
    pub fn has_connection(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::DiscoveringServices
                | SessionState::SubscribingNotifications
                | SessionState::Ready
                | SessionState::Disconnecting
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "Disconnesso",
            SessionState::Scanning => "Ricerca",
            SessionState::Connecting => "Connettendo",
            SessionState::DiscoveringServices => "Scoperta servizi",
            SessionState::SubscribingNotifications => "Attivazione notifiche",
            SessionState::Ready => "Connesso",
            SessionState::Disconnecting => "Disconnessione",
            SessionState::Disconnected => "Disconnesso",
        };

        write!(f, "{}", result)
    }
}

/// A characteristic as seen by the session: enough to find it again on the platform side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub service_uuid: Uuid,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid).copied()
    }
}

/// Commands understood by the vacuum firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VacuumCommand {
    PowerOn,
    PowerOff,
    LevelUp,
    LevelDown,
    Status,
}

impl VacuumCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            VacuumCommand::PowerOn => COMMAND_POWER_ON,
            VacuumCommand::PowerOff => COMMAND_POWER_OFF,
            VacuumCommand::LevelUp => COMMAND_LEVEL_UP,
            VacuumCommand::LevelDown => COMMAND_LEVEL_DOWN,
            VacuumCommand::Status => COMMAND_STATUS,
        }
    }
}

/// Everything the session tells its consumer. Delivered in order through one [`EventSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChange(SessionState),
    DeviceFound(PeripheralHandle),
    ScanComplete,
    ScanError(SessionError),
    Connected,
    Disconnected,
    DataReceived { raw: String, state: VacuumState },
    ConnectionError(SessionError),
}

/// Consumer of session events.
pub trait EventSink {
    fn emit(&mut self, event: SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}

impl EventSink for futures::channel::mpsc::UnboundedSender<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        // the receiving side went away; nobody is left to tell
        if let Err(err) = self.unbounded_send(event) {
            log::debug!("Dropping session event, receiver closed: {:?}", err.into_inner());
        }
    }
}

/// Requests from the front end to the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    StartScan,
    StopScan,
    Connect(PeripheralHandle),
    Send(VacuumCommand),
    Disconnect,
}
