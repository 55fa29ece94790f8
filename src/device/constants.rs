use std::time::Duration;
use uuid::Uuid;

/**
 * How long a scan may run before it is stopped automatically.
 */
pub const SCAN_TIMEOUT: Duration = Duration::from_millis(10_000);

/**
 * How long after the connection is ready the controller asks the peripheral for a status snapshot.
 */
pub const INITIAL_STATUS_DELAY: Duration = Duration::from_millis(500);

/**
 * How long an error message stays visible before it is dismissed.
 */
pub const ERROR_DISMISS_DELAY: Duration = Duration::from_millis(5_000);

/**
 * The UUID of the Bluetooth BLE service exposed by the vacuum firmware
 */
pub const VACUUM_SERVICE: Uuid = Uuid::from_u128(0x19B10000_E8F2_537E_4F6C_D104768A1214);

/**
 * The UUID of the characteristic commands are written to (RX from the point of view of the peripheral).
 */
pub const VACUUM_OUTBOUND_CHARACTERISTIC: Uuid = Uuid::from_u128(0x19B10001_E8F2_537E_4F6C_D104768A1214);

/**
 * The UUID of the characteristic status messages are notified on (TX from the point of view of the peripheral).
 */
pub const VACUUM_INBOUND_CHARACTERISTIC: Uuid = Uuid::from_u128(0x19B10002_E8F2_537E_4F6C_D104768A1214);

/**
 * The standard Client Characteristic Configuration Descriptor.
 */
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/**
 * CCCD value that enables notifications.
 */
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/**
 * Name shown for peripherals whose advertised name is missing or hidden by the OS.
 */
pub const DEFAULT_DEVICE_NAME: &str = "GIGA-Chat";

pub const COMMAND_POWER_ON: &str = "1";
pub const COMMAND_POWER_OFF: &str = "0";
pub const COMMAND_LEVEL_UP: &str = "3";
pub const COMMAND_LEVEL_DOWN: &str = "4";
pub const COMMAND_STATUS: &str = "STATUS";

pub const MIN_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = 4;
