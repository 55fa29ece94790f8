//! Integration tests driving a session end to end with a scripted platform.

use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;
use vacuum_controller::device::constants::{
    VACUUM_INBOUND_CHARACTERISTIC, VACUUM_OUTBOUND_CHARACTERISTIC, VACUUM_SERVICE,
};
use vacuum_controller::device::platform::{BlePlatform, Capabilities, PlatformEvent};
use vacuum_controller::device::registry::DeviceRegistry;
use vacuum_controller::device::session::{Session, SessionOptions};
use vacuum_controller::device::status::VacuumState;
use vacuum_controller::device::types::{
    GattCharacteristic, GattService, LinkId, PeripheralHandle, SessionEvent, SessionState,
};
use vacuum_controller::error::{PlatformError, SessionError};

#[derive(Debug, Clone, PartialEq)]
enum Op {
    StartScan(Uuid),
    StopScan,
    Connect(String),
    Discover,
    Subscribe(Uuid),
    Write(Uuid, Vec<u8>),
    Disconnect,
    Close,
}

#[derive(Clone, Default)]
struct ScriptedPlatform {
    ops: Rc<RefCell<Vec<Op>>>,
}

impl ScriptedPlatform {
    fn record(&self, op: Op) -> Result<(), PlatformError> {
        self.ops.borrow_mut().push(op);
        Ok(())
    }
}

impl BlePlatform for ScriptedPlatform {
    fn start_scan(&mut self, service: Uuid) -> Result<(), PlatformError> {
        self.record(Op::StartScan(service))
    }

    fn stop_scan(&mut self) -> Result<(), PlatformError> {
        self.record(Op::StopScan)
    }

    fn connect(&mut self, _link: LinkId, peripheral: &PeripheralHandle) -> Result<(), PlatformError> {
        self.record(Op::Connect(peripheral.address.clone()))
    }

    fn discover_services(&mut self) -> Result<(), PlatformError> {
        self.record(Op::Discover)
    }

    fn enable_notifications(&mut self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        self.record(Op::Subscribe(characteristic.uuid))
    }

    fn write(&mut self, characteristic: &GattCharacteristic, value: &[u8]) -> Result<(), PlatformError> {
        self.record(Op::Write(characteristic.uuid, value.to_vec()))
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        self.record(Op::Disconnect)
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        self.record(Op::Close)
    }
}

struct Granted;

impl Capabilities for Granted {
    fn is_radio_enabled(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        true
    }
}

fn vacuum(address: &str, name: Option<&str>) -> PeripheralHandle {
    PeripheralHandle::new(format!("hci0/{}", address), name.map(String::from), address)
}

fn vacuum_service() -> GattService {
    GattService {
        uuid: VACUUM_SERVICE,
        characteristics: vec![
            GattCharacteristic { service_uuid: VACUUM_SERVICE, uuid: VACUUM_OUTBOUND_CHARACTERISTIC },
            GattCharacteristic { service_uuid: VACUUM_SERVICE, uuid: VACUUM_INBOUND_CHARACTERISTIC },
        ],
    }
}

fn notification(text: &str) -> PlatformEvent {
    PlatformEvent::CharacteristicChanged {
        link: LinkId(1),
        uuid: VACUUM_INBOUND_CHARACTERISTIC,
        value: text.as_bytes().to_vec(),
    }
}

fn without_state_changes(events: &[SessionEvent]) -> Vec<SessionEvent> {
    events.iter().filter(|event| !matches!(event, SessionEvent::StateChange(_))).cloned().collect()
}

#[test]
fn status_message_examples() {
    let state = VacuumState::parse(r#"{"type":"status","stato":1,"livello":3,"potenza":85,"sensore":412}"#)
        .expect("status message");
    assert_eq!(state, VacuumState { on: true, level: 3, power_watts: 85, sensor: 412 });
    assert_eq!(state.sensor_text(), "0412");

    assert_eq!(VacuumState::parse(r#"{"type":"ack","stato":1}"#), None);
    assert_eq!(VacuumState::parse(r#"{"type":"status","livello":2}"#),
        Some(VacuumState { on: false, level: 2, power_watts: 0, sensor: 0 }));
}

#[test]
fn registry_deduplicates_by_address() {
    let mut registry = DeviceRegistry::new("GIGA-Chat");
    assert!(registry.add(vacuum("AA:BB:CC:DD:EE:01", None)));
    assert!(!registry.add(vacuum("AA:BB:CC:DD:EE:01", Some("Vacuum"))));
    assert!(registry.add(vacuum("AA:BB:CC:DD:EE:02", Some("Vacuum"))));

    let names: Vec<&str> = registry.all().map(|handle| registry.display_name(handle)).collect();
    assert_eq!(names, vec!["GIGA-Chat", "Vacuum"]);
}

#[tokio::test(start_paused = true)]
async fn scan_connect_receive_send_disconnect() {
    let platform = ScriptedPlatform::default();
    let ops = platform.ops.clone();
    let mut session = Session::new(platform, Granted, Vec::new(), SessionOptions::default());
    let peripheral = vacuum("AA:BB:CC:DD:EE:FF", Some("GIGA-Chat"));

    session.start_scan();
    session.handle_platform_event(PlatformEvent::Advertisement(peripheral.clone()));
    session.connect(peripheral.clone());
    assert_eq!(session.state(), SessionState::Connecting);

    session.handle_platform_event(PlatformEvent::ConnectionStateChange { link: LinkId(1), connected: true });
    session.handle_platform_event(PlatformEvent::ServicesDiscovered(LinkId(1), Ok(vec![vacuum_service()])));
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.is_connected());

    session.handle_platform_event(notification(r#"{"type":"status","stato":1,"livello":2,"potenza":40,"sensore":7}"#));
    session.handle_platform_event(notification("garbage"));
    session.send("STATUS");
    session.disconnect();
    assert_eq!(session.state(), SessionState::Idle);

    assert_eq!(*ops.borrow(), vec![
        Op::StartScan(VACUUM_SERVICE),
        Op::StopScan,
        Op::Connect("AA:BB:CC:DD:EE:FF".to_string()),
        Op::Discover,
        Op::Subscribe(VACUUM_INBOUND_CHARACTERISTIC),
        Op::Write(VACUUM_OUTBOUND_CHARACTERISTIC, b"STATUS".to_vec()),
        Op::Disconnect,
        Op::Close,
    ]);

    assert_eq!(without_state_changes(session.sink()), vec![
        SessionEvent::DeviceFound(peripheral),
        SessionEvent::ScanComplete,
        SessionEvent::Connected,
        SessionEvent::DataReceived {
            raw: r#"{"type":"status","stato":1,"livello":2,"potenza":40,"sensore":7}"#.to_string(),
            state: VacuumState { on: true, level: 2, power_watts: 40, sensor: 7 },
        },
        SessionEvent::Disconnected,
    ]);
}

#[tokio::test(start_paused = true)]
async fn missing_service_fails_and_allows_retry() {
    let platform = ScriptedPlatform::default();
    let ops = platform.ops.clone();
    let mut session = Session::new(platform, Granted, Vec::new(), SessionOptions::default());
    let peripheral = vacuum("AA:BB:CC:DD:EE:FF", None);

    session.connect(peripheral.clone());
    session.handle_platform_event(PlatformEvent::ConnectionStateChange { link: LinkId(1), connected: true });
    session.handle_platform_event(PlatformEvent::ServicesDiscovered(LinkId(1), Ok(vec![])));

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(without_state_changes(session.sink()), vec![
        SessionEvent::ConnectionError(SessionError::ServiceNotFound),
        SessionEvent::Disconnected,
    ]);

    session.sink_mut().clear();
    ops.borrow_mut().clear();
    session.connect(peripheral);
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(*ops.borrow(), vec![Op::Connect("AA:BB:CC:DD:EE:FF".to_string())]);

    // a late result for the first attempt must not touch the second one
    session.handle_platform_event(PlatformEvent::ConnectionStateChange { link: LinkId(1), connected: false });
    session.handle_platform_event(PlatformEvent::ServicesDiscovered(LinkId(1), Err(0x101)));
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(without_state_changes(session.sink()).is_empty());

    session.handle_platform_event(PlatformEvent::ConnectionStateChange { link: LinkId(2), connected: true });
    assert_eq!(session.state(), SessionState::DiscoveringServices);
}
