use log::{debug, info, warn};
use tokio::time::Instant;
use uuid::Uuid;

use crate::device::constants::{SCAN_TIMEOUT, VACUUM_INBOUND_CHARACTERISTIC, VACUUM_OUTBOUND_CHARACTERISTIC, VACUUM_SERVICE};
use crate::device::platform::{BlePlatform, Capabilities, PlatformEvent};
use crate::device::status::VacuumState;
use crate::device::timer::{TimerHandle, TimerQueue};
use crate::device::types::{EventSink, GattCharacteristic, GattService, LinkId, PeripheralHandle, SessionCommand, SessionEvent, SessionState};
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub scan_timeout: std::time::Duration,
    /// Wait for the CCCD write to be acknowledged before declaring the session ready.
    pub await_notification_ack: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            scan_timeout: SCAN_TIMEOUT,
            await_notification_ack: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    ScanTimeout,
}

/// Scan, connect, discover, subscribe, write and disconnect for one peripheral at a time.
///
/// The session never blocks and never returns errors: radio operations are handed to the
/// [`BlePlatform`], their outcomes come back through [`Session::handle_platform_event`], and
/// everything the consumer needs to know is emitted on the [`EventSink`]. All entry points must
/// be called from a single task.
pub struct Session<P, C, S> {
    platform: P,
    capabilities: C,
    sink: S,
    options: SessionOptions,
    state: SessionState,
    peripheral: Option<PeripheralHandle>,
    link: LinkId,
    inbound: Option<GattCharacteristic>,
    outbound: Option<GattCharacteristic>,
    timers: TimerQueue<SessionTimer>,
    scan_timer: Option<TimerHandle>,
}

impl<P: BlePlatform, C: Capabilities, S: EventSink> Session<P, C, S> {
    pub fn new(platform: P, capabilities: C, sink: S, options: SessionOptions) -> Self {
        Session {
            platform,
            capabilities,
            sink,
            options,
            state: SessionState::Idle,
            peripheral: None,
            link: LinkId::default(),
            inbound: None,
            outbound: None,
            timers: TimerQueue::new(),
            scan_timer: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    /// True once both characteristics are known.
    pub fn is_connected(&self) -> bool {
        self.peripheral.is_some() && self.inbound.is_some() && self.outbound.is_some()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn capabilities(&self) -> &C {
        &self.capabilities
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartScan => self.start_scan(),
            SessionCommand::StopScan => self.stop_scan(),
            SessionCommand::Connect(peripheral) => self.connect(peripheral),
            SessionCommand::Send(command) => self.send(command.as_str()),
            SessionCommand::Disconnect => self.disconnect(),
        }
    }

    /// Callbacks tagged with an older connection than the current one are dropped.
    pub fn handle_platform_event(&mut self, event: PlatformEvent) {
        if let Some(link) = event.link() {
            if link != self.link {
                debug!("Ignoring callback from stale link {:?}: {:?}", link, event);
                return;
            }
        }

        match event {
            PlatformEvent::Advertisement(peripheral) => self.on_advertisement(peripheral),
            PlatformEvent::ScanFailed(code) => self.on_scan_failed(code),
            PlatformEvent::ConnectionStateChange { connected: true, .. } => self.on_connected(),
            PlatformEvent::ConnectionStateChange { connected: false, .. } => self.on_disconnected(),
            PlatformEvent::ServicesDiscovered(_, result) => self.on_services_discovered(result),
            PlatformEvent::CharacteristicChanged { uuid, value, .. } => self.on_characteristic_changed(uuid, &value),
            PlatformEvent::DescriptorWrite { success, .. } => self.on_descriptor_write(success),
            PlatformEvent::CharacteristicWrite { uuid, success, .. } => self.on_characteristic_write(uuid, success),
        }
    }

    pub fn fire_due_timers(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                SessionTimer::ScanTimeout => {
                    self.scan_timer = None;
                    info!("Scan window elapsed");
                    self.stop_scan();
                },
            }
        }
    }

    pub fn start_scan(&mut self) {
        if self.state == SessionState::Scanning {
            debug!("Already scanning");
            return;
        }

        if self.state.has_connection() {
            self.sink.emit(SessionEvent::ScanError(SessionError::Busy(self.state)));
            return;
        }

        if !self.capabilities.has_permission() {
            self.sink.emit(SessionEvent::ScanError(SessionError::PermissionDenied));
            return;
        }

        if !self.capabilities.is_radio_enabled() {
            self.sink.emit(SessionEvent::ScanError(SessionError::RadioDisabled));
            return;
        }

        if let Err(err) = self.platform.start_scan(VACUUM_SERVICE) {
            warn!("Scanning failed {:?}", err);
            let error = SessionError::from_platform(err, SessionError::ScannerUnavailable);
            self.sink.emit(SessionEvent::ScanError(error));
            return;
        }

        info!("Scanning for service {}...", VACUUM_SERVICE);
        self.set_state(SessionState::Scanning);
        self.scan_timer = Some(self.timers.schedule(Instant::now(), self.options.scan_timeout, SessionTimer::ScanTimeout));
    }

    pub fn stop_scan(&mut self) {
        if self.state != SessionState::Scanning {
            return;
        }

        self.cancel_scan_timer();

        // revoked permission must not keep us stuck in Scanning
        if self.capabilities.has_permission() {
            if let Err(err) = self.platform.stop_scan() {
                debug!("Ignoring failure to stop scan: {:?}", err);
            }
        }

        self.set_state(SessionState::Idle);
        self.sink.emit(SessionEvent::ScanComplete);
    }

    pub fn connect(&mut self, peripheral: PeripheralHandle) {
        if !self.capabilities.has_permission() {
            self.sink.emit(SessionEvent::ConnectionError(SessionError::PermissionDenied));
            return;
        }

        if !self.capabilities.is_radio_enabled() {
            self.sink.emit(SessionEvent::ConnectionError(SessionError::RadioDisabled));
            return;
        }

        if self.state.has_connection() {
            self.sink.emit(SessionEvent::ConnectionError(SessionError::Busy(self.state)));
            return;
        }

        self.stop_scan();

        self.link = self.link.next();
        info!("Connecting to peripheral {} {:?} as {:?}...", peripheral.address, peripheral.name, self.link);
        if let Err(err) = self.platform.connect(self.link, &peripheral) {
            warn!("Connecting to peripheral failed: {:?}", err);
            let error = SessionError::from_platform(err, SessionError::ConnectFailed);
            self.sink.emit(SessionEvent::ConnectionError(error));
            return;
        }

        self.peripheral = Some(peripheral);
        self.set_state(SessionState::Connecting);
    }

    pub fn send(&mut self, command: &str) {
        if !self.capabilities.has_permission() {
            self.sink.emit(SessionEvent::ConnectionError(SessionError::PermissionDenied));
            return;
        }

        let outbound = match self.outbound {
            Some(characteristic) if self.state == SessionState::Ready => characteristic,
            _ => {
                self.sink.emit(SessionEvent::ConnectionError(SessionError::NotReady));
                return;
            },
        };

        debug!("Sending command {:?}", command);
        if let Err(err) = self.platform.write(&outbound, command.as_bytes()) {
            warn!("Failed to send to outbound characteristic: {:?}", err);
            let error = SessionError::from_platform(err, SessionError::WriteFailed);
            self.sink.emit(SessionEvent::ConnectionError(error));
        }
    }

    /// Best effort: the session ends up idle whether or not the platform call succeeds.
    pub fn disconnect(&mut self) {
        if self.peripheral.is_none() && !self.state.has_connection() {
            debug!("Not connected, nothing to disconnect");
            return;
        }

        self.set_state(SessionState::Disconnecting);

        if self.capabilities.has_permission() {
            if let Err(err) = self.platform.disconnect() {
                debug!("Ignoring failure to disconnect: {:?}", err);
            }
        }

        self.release_connection();
    }

    fn on_advertisement(&mut self, peripheral: PeripheralHandle) {
        if self.state != SessionState::Scanning {
            debug!("Ignoring advertisement from {} outside of a scan", peripheral.address);
            return;
        }

        self.sink.emit(SessionEvent::DeviceFound(peripheral));
    }

    fn on_scan_failed(&mut self, code: i32) {
        if self.state != SessionState::Scanning {
            return;
        }

        warn!("Scan failed with code {}", code);
        self.cancel_scan_timer();
        self.set_state(SessionState::Idle);
        self.sink.emit(SessionEvent::ScanError(SessionError::ScanFailed(code)));
    }

    fn on_connected(&mut self) {
        if self.state != SessionState::Connecting {
            warn!("Unexpected connection in state {:?}", self.state);
            return;
        }

        info!("Connected; Discovering services...");
        self.set_state(SessionState::DiscoveringServices);

        if !self.capabilities.has_permission() {
            self.fail_connection(SessionError::PermissionDenied);
            return;
        }

        if let Err(err) = self.platform.discover_services() {
            let error = SessionError::from_platform(err, SessionError::ServiceDiscoveryFailed);
            self.fail_connection(error);
        }
    }

    fn on_disconnected(&mut self) {
        if self.peripheral.is_none() && !self.state.has_connection() {
            debug!("Disconnect for a connection that is already released");
            return;
        }

        warn!("Connection lost");
        self.release_connection();
    }

    fn on_services_discovered(&mut self, result: Result<Vec<GattService>, i32>) {
        if self.state != SessionState::DiscoveringServices {
            warn!("Unexpected service discovery result in state {:?}", self.state);
            return;
        }

        let services = match result {
            Ok(services) => services,
            Err(status) => {
                warn!("Service discovery failed with status {}", status);
                self.fail_connection(SessionError::ServiceDiscoveryFailed);
                return;
            },
        };

        let service = match services.iter().find(|service| service.uuid == VACUUM_SERVICE) {
            Some(service) => service,
            None => {
                self.fail_connection(SessionError::ServiceNotFound);
                return;
            },
        };

        let (inbound, outbound) = match (
            service.characteristic(VACUUM_INBOUND_CHARACTERISTIC),
            service.characteristic(VACUUM_OUTBOUND_CHARACTERISTIC),
        ) {
            (Some(inbound), Some(outbound)) => (inbound, outbound),
            _ => {
                self.fail_connection(SessionError::CharacteristicsNotFound);
                return;
            },
        };

        self.inbound = Some(inbound);
        self.outbound = Some(outbound);

        info!("Subscribing to characteristic {:?} {:?}", inbound.service_uuid, inbound.uuid);
        self.set_state(SessionState::SubscribingNotifications);

        if !self.capabilities.has_permission() {
            self.fail_connection(SessionError::PermissionDenied);
            return;
        }

        if let Err(err) = self.platform.enable_notifications(&inbound) {
            let error = SessionError::from_platform(err, SessionError::NotificationsFailed);
            self.fail_connection(error);
            return;
        }

        if !self.options.await_notification_ack {
            self.become_ready();
        }
    }

    fn on_descriptor_write(&mut self, success: bool) {
        match (self.state, success) {
            (SessionState::SubscribingNotifications, true) => self.become_ready(),
            (SessionState::SubscribingNotifications, false) => self.fail_connection(SessionError::NotificationsFailed),
            (SessionState::Ready, false) => {
                self.sink.emit(SessionEvent::ConnectionError(SessionError::NotificationsFailed));
            },
            (state, success) => debug!("Descriptor write ({}) in state {:?}", success, state),
        }
    }

    fn on_characteristic_changed(&mut self, uuid: Uuid, value: &[u8]) {
        let inbound = match self.inbound {
            Some(inbound) if inbound.uuid == uuid => inbound,
            _ => return,
        };

        if !matches!(self.state, SessionState::SubscribingNotifications | SessionState::Ready) {
            return;
        }

        let raw = String::from_utf8_lossy(value).into_owned();
        match VacuumState::parse(&raw) {
            Some(state) => self.sink.emit(SessionEvent::DataReceived { raw, state }),
            None => debug!("Unrecognized message on {}: {:?}", inbound.uuid, raw),
        }
    }

    fn on_characteristic_write(&mut self, uuid: Uuid, success: bool) {
        if success {
            return;
        }

        if self.outbound.map(|c| c.uuid) == Some(uuid) {
            warn!("Write to {} was rejected by the peripheral", uuid);
            self.sink.emit(SessionEvent::ConnectionError(SessionError::WriteFailed));
        }
    }

    fn become_ready(&mut self) {
        info!("Peripheral ready");
        self.set_state(SessionState::Ready);
        self.sink.emit(SessionEvent::Connected);
    }

    // A failed attempt is reported once and then handled like a lost connection, so a new
    // connect() can follow right away.
    fn fail_connection(&mut self, error: SessionError) {
        warn!("Connection attempt failed: {}", error);
        self.sink.emit(SessionEvent::ConnectionError(error));
        self.disconnect();
    }

    fn release_connection(&mut self) {
        if self.capabilities.has_permission() {
            if let Err(err) = self.platform.close() {
                debug!("Ignoring failure to close connection: {:?}", err);
            }
        }

        self.inbound = None;
        self.outbound = None;
        if let Some(peripheral) = self.peripheral.take() {
            info!("Released connection to {}", peripheral.address);
        }

        self.set_state(SessionState::Disconnected);
        self.sink.emit(SessionEvent::Disconnected);
        self.set_state(SessionState::Idle);
    }

    fn cancel_scan_timer(&mut self) {
        if let Some(handle) = self.scan_timer.take() {
            self.timers.cancel(handle);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }

        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.sink.emit(SessionEvent::StateChange(state));
    }
}
