use std::time::Duration;
use log::{debug, info};
use tokio::time::Instant;

use crate::device::constants::{DEFAULT_DEVICE_NAME, ERROR_DISMISS_DELAY, INITIAL_STATUS_DELAY};
use crate::device::registry::DeviceRegistry;
use crate::device::status::VacuumState;
use crate::device::timer::{TimerHandle, TimerQueue};
use crate::device::types::{SessionCommand, SessionEvent, SessionState, VacuumCommand};
use crate::error::ControlError;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub initial_status_delay: Duration,
    pub error_dismiss: Duration,
    pub device_name_fallback: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            initial_status_delay: INITIAL_STATUS_DELAY,
            error_dismiss: ERROR_DISMISS_DELAY,
            device_name_fallback: DEFAULT_DEVICE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerTimer {
    InitialStatus,
    DismissError,
}

/// What a front end shows: the devices found by the last scan, the last reported vacuum state
/// and the current error banner. Fed with [`SessionEvent`]s; produces [`SessionCommand`]s.
pub struct VacuumController {
    options: ControllerOptions,
    registry: DeviceRegistry,
    state: VacuumState,
    session_state: SessionState,
    connected: bool,
    last_message: Option<String>,
    error: Option<String>,
    timers: TimerQueue<ControllerTimer>,
    status_timer: Option<TimerHandle>,
    error_timer: Option<TimerHandle>,
}

impl VacuumController {
    pub fn new(options: ControllerOptions) -> Self {
        let registry = DeviceRegistry::new(options.device_name_fallback.clone());

        VacuumController {
            options,
            registry,
            state: VacuumState::default(),
            session_state: SessionState::Idle,
            connected: false,
            last_message: None,
            error: None,
            timers: TimerQueue::new(),
            status_timer: None,
            error_timer: None,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn vacuum_state(&self) -> &VacuumState {
        &self.state
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// A new search starts from an empty device list.
    pub fn start_scan(&mut self) -> SessionCommand {
        self.dismiss_error();
        self.registry.clear();
        SessionCommand::StartScan
    }

    /// Returns true when the event changed something worth redrawing. For `DeviceFound` that
    /// means the peripheral was not in the list yet.
    pub fn handle_event(&mut self, event: &SessionEvent, now: Instant) -> bool {
        match event {
            SessionEvent::StateChange(state) => {
                self.session_state = *state;
                true
            },
            SessionEvent::DeviceFound(peripheral) => self.registry.add(peripheral.clone()),
            SessionEvent::ScanComplete => false,
            SessionEvent::ScanError(error) | SessionEvent::ConnectionError(error) => {
                self.show_error(error.to_string(), now);
                true
            },
            SessionEvent::Connected => {
                self.connected = true;
                if let Some(handle) = self.status_timer.take() {
                    self.timers.cancel(handle);
                }
                self.status_timer = Some(self.timers.schedule(now, self.options.initial_status_delay, ControllerTimer::InitialStatus));
                true
            },
            SessionEvent::Disconnected => {
                self.connected = false;
                if let Some(handle) = self.status_timer.take() {
                    self.timers.cancel(handle);
                }
                self.state = VacuumState::default();
                self.last_message = Some("Connessione persa".to_string());
                true
            },
            SessionEvent::DataReceived { raw, state } => {
                if self.state.level != state.level {
                    debug!("Level changed {} -> {}", self.state.level, state.level);
                }
                self.last_message = Some(raw.clone());
                self.state = *state;
                true
            },
        }
    }

    /// Checks a command against the last known state. Refused commands are never sent.
    pub fn request(&self, command: VacuumCommand) -> Result<SessionCommand, ControlError> {
        if !self.connected {
            return Err(ControlError::NotConnected);
        }

        match command {
            VacuumCommand::PowerOn if self.state.on => return Err(ControlError::AlreadyOn),
            VacuumCommand::PowerOff if !self.state.on => return Err(ControlError::PoweredOff),
            VacuumCommand::LevelUp if !self.state.can_increase() => {
                return Err(if self.state.on { ControlError::LevelAtMaximum } else { ControlError::PoweredOff });
            },
            VacuumCommand::LevelDown if !self.state.can_decrease() => {
                return Err(if self.state.on { ControlError::LevelAtMinimum } else { ControlError::PoweredOff });
            },
            _ => {},
        }

        Ok(SessionCommand::Send(command))
    }

    /// Runs due timers and returns the commands they produce.
    pub fn fire_due_timers(&mut self, now: Instant) -> Vec<SessionCommand> {
        let mut commands = Vec::new();

        for timer in self.timers.pop_due(now) {
            match timer {
                ControllerTimer::InitialStatus => {
                    self.status_timer = None;
                    if self.connected {
                        info!("Requesting initial status");
                        commands.push(SessionCommand::Send(VacuumCommand::Status));
                    }
                },
                ControllerTimer::DismissError => {
                    self.error_timer = None;
                    self.error = None;
                },
            }
        }

        commands
    }

    fn show_error(&mut self, message: String, now: Instant) {
        if let Some(handle) = self.error_timer.take() {
            self.timers.cancel(handle);
        }
        self.error = Some(message);
        self.error_timer = Some(self.timers.schedule(now, self.options.error_dismiss, ControllerTimer::DismissError));
    }

    fn dismiss_error(&mut self) {
        if let Some(handle) = self.error_timer.take() {
            self.timers.cancel(handle);
        }
        self.error = None;
    }
}
