//! Application-wide constants and compile-time configuration.
//!
//! All protocol identifiers, timing parameters, and capacity limits
//! live here so they can be tuned in one place.

use crate::ble::ScanParams;

// Capacity

/// Default number of peers tracked at once (Connecting + Connected).
///
/// The slot pool and coordinator take the capacity as a const generic
/// parameter defaulting to this value; pick another `N` to resize.
pub const MAX_CONN: usize = 4;

// GATT

/// Primary service exposed by the sensor transmitters.
pub const SERVICE_UUID: u16 = 0xFF00;

/// Sample characteristic inside [`SERVICE_UUID`]. Notifies only.
pub const CHARACTERISTIC_UUID: u16 = 0xEE00;

/// Client Characteristic Configuration value that enables notifications.
pub const CCCD_NOTIFY_ENABLE: [u8; 2] = [0x01, 0x00];

// Advertisement filter

/// Fixed prefix of the advertised name, followed by `<digits>[/<digits>]`.
pub const DEVICE_NAME_PREFIX: &str = "RIOT-BLE-";

/// Names longer than this are truncated when copied into a slot.
pub const DEVICE_NAME_MAX_LEN: usize = 31;

// Scanning / connecting

/// Scan interval and window are in 0.625 ms units.
/// 10000 = 6.25 s interval, 200 = 125 ms window, 100 ms per scan pass.
pub const SCAN_PARAMS: ScanParams = ScanParams {
    interval: 10_000,
    window: 200,
    filter_policy: 0,
    limited: false,
    passive: false,
    filter_duplicates: true,
    duration_ms: 100,
};

/// Timeout handed to the host stack for each connect attempt.
pub const CONNECT_TIMEOUT_MS: u32 = 100;

// Link management

/// HCI reason "Remote User Terminated Connection".
pub const DISCONNECT_REASON_USER_TERMINATED: u8 = 0x13;

/// Reported signal strength when the host cannot read it.
/// 127 is the HCI "RSSI not available" value.
pub const RSSI_UNAVAILABLE: i8 = 127;
