use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::SessionState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to read from stdin: {source}")]
    IOError { #[from] source: io::Error },

    #[error("No peripheral with address {0} was found")]
    PeripheralNotFound(String),

    #[error("The bluetooth session stopped unexpectedly")]
    SessionStopped,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,
}

impl DeviceError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, DeviceError::Btle { source: btleplug::Error::PermissionDenied })
    }
}

/// Synchronous rejection of a platform radio operation. Anything that fails later is
/// delivered as a [`crate::device::platform::PlatformEvent`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0}")]
    SecurityDenied(String),

    #[error("No GATT connection")]
    NotConnected,

    #[error("Unknown peripheral {0}")]
    UnknownPeripheral(String),

    #[error("Operation rejected: {0}")]
    Rejected(String),
}

/// Errors reported by the session through the event sink. The messages are shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Permessi Bluetooth mancanti")]
    PermissionDenied,

    #[error("Bluetooth non abilitato")]
    RadioDisabled,

    #[error("Scanner Bluetooth non disponibile")]
    ScannerUnavailable,

    #[error("Errore sicurezza: {0}")]
    SecurityDenied(String),

    #[error("Scan fallito: {0}")]
    ScanFailed(i32),

    #[error("Servizio non trovato")]
    ServiceNotFound,

    #[error("Caratteristiche non trovate")]
    CharacteristicsNotFound,

    #[error("Errore scoperta servizi")]
    ServiceDiscoveryFailed,

    #[error("Errore invio comando")]
    WriteFailed,

    #[error("Connessione fallita")]
    ConnectFailed,

    #[error("Caratteristica RX non disponibile")]
    NotReady,

    #[error("Operazione non consentita nello stato {0:?}")]
    Busy(SessionState),

    #[error("Attivazione notifiche fallita")]
    NotificationsFailed,
}

impl SessionError {
    /// Maps a synchronous platform rejection onto the user-facing taxonomy. `fallback` is used for
    /// everything that is not an authorization failure.
    pub fn from_platform(error: PlatformError, fallback: SessionError) -> SessionError {
        match error {
            PlatformError::SecurityDenied(message) => SessionError::SecurityDenied(message),
            _ => fallback,
        }
    }
}

/// Commands refused locally, before anything is sent to the peripheral.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Non connesso")]
    NotConnected,

    #[error("Aspirapolvere già acceso")]
    AlreadyOn,

    #[error("Aspirapolvere spento")]
    PoweredOff,

    #[error("Livello massimo raggiunto")]
    LevelAtMaximum,

    #[error("Livello minimo raggiunto")]
    LevelAtMinimum,
}
