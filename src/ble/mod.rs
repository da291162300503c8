//! Bluetooth Low Energy subsystem.
//!
//! The receiver runs in **Central** role and tracks several sensor
//! peripherals at once:
//!
//! 1. **Scanner** - owns the "scan active" flag and decides when a
//!    background scan may (re)start.
//! 2. **Slot pool** - fixed-capacity table of per-peer connection records.
//! 3. **GATT client** - service → characteristic → CCCD write cascade run
//!    once per new connection.
//! 4. **Router** - the state machine fed by [`GapEvent`]s from the host
//!    stack; drives the three components above and decodes notifications.
//!
//! The host stack itself sits behind [`BleHost`]. Every request is
//! non-blocking; its outcome comes back later as a [`GapEvent`].

pub mod addr;
pub mod adv_parser;
pub mod gatt_client;
pub mod name_filter;
pub mod router;
pub mod scanner;
pub mod slot_pool;

#[cfg(feature = "embedded")]
pub mod softdevice;

pub use addr::{format_address, AddressKind, PeerAddress};
pub use gatt_client::{CascadeState, NotifyState};
pub use router::Coordinator;
pub use scanner::{ScanController, ScanOutcome};
pub use slot_pool::{ConnectionSlot, SlotId, SlotPool, SlotState};

use crate::error::BleError;

/// Connection handle assigned by the host stack.
pub type ConnHandle = u16;

/// Inclusive attribute handle range of a discovered service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

/// GAP discovery parameters handed to [`BleHost::start_scan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// Scan interval (0.625 ms units).
    pub interval: u16,
    /// Scan window (0.625 ms units).
    pub window: u16,
    pub filter_policy: u8,
    pub limited: bool,
    pub passive: bool,
    pub filter_duplicates: bool,
    /// Length of one scan pass; `ScanComplete` follows when it elapses.
    pub duration_ms: u32,
}

/// Capabilities consumed from the host BLE stack.
///
/// Methods return only the synchronous accept/reject of a request. The
/// result of an accepted request arrives as a [`GapEvent`].
pub trait BleHost {
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError>;

    fn cancel_scan(&mut self) -> Result<(), BleError>;

    /// Start connecting. `context` must be echoed as the `hint` of the
    /// events this attempt produces.
    fn connect(
        &mut self,
        peer: &PeerAddress,
        timeout_ms: u32,
        context: SlotId,
    ) -> Result<(), BleError>;

    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), BleError>;

    fn discover_service_by_uuid(&mut self, conn: ConnHandle, uuid: u16) -> Result<(), BleError>;

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), BleError>;

    fn write_attribute(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        value: [u8; 2],
    ) -> Result<(), BleError>;

    /// Current signal strength of an established link, best effort.
    fn read_rssi(&mut self, conn: ConnHandle) -> Result<i8, BleError>;
}

/// Events delivered by the host stack, dispatched by
/// [`Coordinator::dispatch`].
///
/// `hint` carries the context given to [`BleHost::connect`] when the stack
/// still has it. It is never trusted on its own: the router checks it
/// against the event's address or handle before using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapEvent<'a> {
    /// One advertising report while scanning.
    Advertisement {
        peer: PeerAddress,
        rssi: i8,
        data: &'a [u8],
    },
    /// The scan pass ended on its own (not after `cancel_scan`).
    ScanComplete,
    /// Outcome of a connect attempt.
    Connect {
        peer: PeerAddress,
        result: Result<ConnHandle, BleError>,
        hint: Option<SlotId>,
    },
    Disconnect {
        handle: ConnHandle,
        reason: u8,
        hint: Option<SlotId>,
    },
    /// The target primary service was found.
    ServiceDiscovered {
        handle: ConnHandle,
        service: HandleRange,
    },
    /// Service discovery ended (after zero or more `ServiceDiscovered`).
    ServiceDiscoveryComplete { handle: ConnHandle },
    CharacteristicDiscovered {
        handle: ConnHandle,
        uuid: u16,
        value_handle: u16,
    },
    CharacteristicDiscoveryComplete { handle: ConnHandle },
    /// Confirmation of a `write_attribute` request.
    WriteComplete {
        handle: ConnHandle,
        attr_handle: u16,
        result: Result<(), BleError>,
    },
    /// Handle value notification.
    Notification {
        handle: ConnHandle,
        data: &'a [u8],
        hint: Option<SlotId>,
    },
}
