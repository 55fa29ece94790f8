use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::{DEFAULT_DEVICE_NAME, ERROR_DISMISS_DELAY, INITIAL_STATUS_DELAY, SCAN_TIMEOUT};
use crate::device::controller::ControllerOptions;
use crate::device::session::SessionOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub scan_timeout_ms: u64,
    pub initial_status_delay_ms: u64,
    pub error_dismiss_ms: u64,
    pub await_notification_ack: bool,
    pub device_name_fallback: String,
    pub log_level: String,
}

impl Config {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
            await_notification_ack: self.await_notification_ack,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            initial_status_delay: Duration::from_millis(self.initial_status_delay_ms),
            error_dismiss: Duration::from_millis(self.error_dismiss_ms),
            device_name_fallback: self.device_name_fallback.clone(),
        }
    }

    /// Unknown level names fall back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_timeout_ms: SCAN_TIMEOUT.as_millis() as u64,
            initial_status_delay_ms: INITIAL_STATUS_DELAY.as_millis() as u64,
            error_dismiss_ms: ERROR_DISMISS_DELAY.as_millis() as u64,
            await_notification_ack: false,
            device_name_fallback: DEFAULT_DEVICE_NAME.to_string(),
            log_level: "info".to_string(),
        }
    }
}
