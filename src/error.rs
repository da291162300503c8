//! Unified error type for blerx.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (feature `defmt`) for on-target logging
//! and `core::fmt::Display` for the host `log` backend.

use core::fmt;

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The host stack refused or failed a request.
    Ble(BleError),

    /// Advertisement data is not a well-formed AD structure list.
    AdvMalformed,

    /// Notification payload is shorter than the sample layout.
    PayloadTooShort { len: usize },

    /// Every slot is in use.
    PoolFull,

    /// A slot already tracks this peer address.
    AlreadyTracked,

    /// No slot matches the event's address or handle.
    UnknownPeer,

    /// The slot is not in the state the transition requires.
    InvalidTransition,

    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Failures reported by the host BLE stack (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Raw status code from the stack.
    Raw(i32),
    /// Scan could not start or was aborted.
    ScanFailed,
    /// Connection attempt failed.
    ConnectFailed,
    /// GATT discovery failed.
    DiscoveryFailed,
    /// Attribute write / notify enablement failed.
    NotifyFailed,
    /// The stack has no room for another request right now.
    Busy,
    /// Procedure timed out.
    Timeout,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::Raw(rc) => write!(f, "rc={}", rc),
            BleError::ScanFailed => f.write_str("scan failed"),
            BleError::ConnectFailed => f.write_str("connect failed"),
            BleError::DiscoveryFailed => f.write_str("discovery failed"),
            BleError::NotifyFailed => f.write_str("notify enable failed"),
            BleError::Busy => f.write_str("busy"),
            BleError::Timeout => f.write_str("timeout"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Ble(e) => write!(f, "ble: {}", e),
            Error::AdvMalformed => f.write_str("malformed advertisement"),
            Error::PayloadTooShort { len } => write!(f, "payload too short ({} bytes)", len),
            Error::PoolFull => f.write_str("max conn reached"),
            Error::AlreadyTracked => f.write_str("already tracked"),
            Error::UnknownPeer => f.write_str("unknown peer"),
            Error::InvalidTransition => f.write_str("invalid slot transition"),
            Error::BufferOverflow => f.write_str("buffer overflow"),
        }
    }
}
