//! BLE GATT sample client - discovers the sample characteristic on a
//! connected peripheral and subscribes to its notifications.
//!
//! After the GAP connection is established, the cascade:
//! 1. Discovers the sample service (UUID 0xFF00) by UUID.
//! 2. Enumerates the characteristics in the service's handle range and
//!    picks the sample characteristic (UUID 0xEE00).
//! 3. Writes `0x0001` to its CCCD to enable notifications.
//!
//! Each step is a host request; the next step runs when the matching
//! [`GapEvent`](crate::ble::GapEvent) comes back. Gaps (no service, no
//! characteristic) leave the link connected but idle. A failed CCCD write
//! is logged and not retried; [`NotifyState`] records the outcome.

use core::fmt;

use crate::ble::{BleHost, ConnectionSlot, HandleRange};
use crate::config::{CCCD_NOTIFY_ENABLE, CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::error::{BleError, Error};

/// Progress of the discovery cascade for one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CascadeState {
    /// Not started (slot not yet connected).
    Idle,
    /// Waiting for the service discovery result.
    ServicePending,
    /// Waiting for characteristic discovery results.
    CharacteristicsPending,
    /// CCCD write issued. See [`NotifyState`] for its outcome.
    Subscribed,
    /// Connected peer lacks the sample service.
    ServiceMissing,
    /// Service present but the sample characteristic is not.
    CharacteristicMissing,
    /// The host refused a discovery request mid-cascade.
    DiscoveryFailed,
}

/// Whether notifications are known to be flowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NotifyState {
    /// No write issued yet, or issued but not confirmed.
    Unknown,
    /// CCCD write confirmed.
    Enabled,
    /// CCCD write rejected or failed.
    Disabled,
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CascadeState::Idle => "idle",
            CascadeState::ServicePending => "service pending",
            CascadeState::CharacteristicsPending => "characteristics pending",
            CascadeState::Subscribed => "subscribed",
            CascadeState::ServiceMissing => "service missing",
            CascadeState::CharacteristicMissing => "characteristic missing",
            CascadeState::DiscoveryFailed => "discovery failed",
        })
    }
}

/// CCCD handle for a characteristic value handle.
///
/// Assumes the descriptor directly follows the value attribute, which is
/// how the sensor transmitters lay out their table. Not discovered.
pub const fn cccd_handle_for(value_handle: u16) -> u16 {
    value_handle.wrapping_add(1)
}

/// Start the cascade on a freshly connected slot.
///
/// An error means the host refused service discovery; the caller should
/// drop the link.
pub fn discover_and_subscribe<H: BleHost>(
    slot: &mut ConnectionSlot,
    host: &mut H,
) -> Result<(), Error> {
    let handle = slot.conn_handle().ok_or(Error::InvalidTransition)?;

    host.discover_service_by_uuid(handle, SERVICE_UUID)?;
    slot.cascade = CascadeState::ServicePending;
    debug!("discovering service (dev={})", slot.name());
    Ok(())
}

/// Service found: enumerate its characteristics.
pub fn on_service_discovered<H: BleHost>(
    slot: &mut ConnectionSlot,
    host: &mut H,
    service: HandleRange,
) {
    if slot.cascade != CascadeState::ServicePending {
        return;
    }
    let Some(handle) = slot.conn_handle() else {
        return;
    };

    info!(
        "svc found (start={} end={} dev={})",
        service.start,
        service.end,
        slot.name()
    );

    match host.discover_characteristics(handle, service) {
        Ok(()) => slot.cascade = CascadeState::CharacteristicsPending,
        Err(e) => {
            warn!("chr discovery failed {} (dev={})", e, slot.name());
            slot.cascade = CascadeState::DiscoveryFailed;
        }
    }
}

pub fn on_service_discovery_complete(slot: &mut ConnectionSlot) {
    info!("svc discovery complete (dev={})", slot.name());
    if slot.cascade == CascadeState::ServicePending {
        info!("service not found, link left idle (dev={})", slot.name());
        slot.cascade = CascadeState::ServiceMissing;
    }
}

/// One characteristic of the service. Only the first sample
/// characteristic is acted on.
pub fn on_characteristic_discovered<H: BleHost>(
    slot: &mut ConnectionSlot,
    host: &mut H,
    uuid: u16,
    value_handle: u16,
) {
    if slot.cascade != CascadeState::CharacteristicsPending || uuid != CHARACTERISTIC_UUID {
        return;
    }
    let Some(handle) = slot.conn_handle() else {
        return;
    };

    let cccd = cccd_handle_for(value_handle);
    slot.value_handle = Some(value_handle);
    slot.notify_config_handle = Some(cccd);
    slot.cascade = CascadeState::Subscribed;
    slot.notify = NotifyState::Unknown;

    info!("enable notify (ccc={}, dev={})", cccd, slot.name());
    if let Err(e) = host.write_attribute(handle, cccd, CCCD_NOTIFY_ENABLE) {
        warn!("CCC write failed {}", e);
        slot.notify = NotifyState::Disabled;
    }
}

pub fn on_characteristic_discovery_complete(slot: &mut ConnectionSlot) {
    info!("chr discovery complete (dev={})", slot.name());
    if slot.cascade == CascadeState::CharacteristicsPending {
        info!("sample characteristic not found, link left idle (dev={})", slot.name());
        slot.cascade = CascadeState::CharacteristicMissing;
    }
}

/// Confirmation of the CCCD write.
pub fn on_write_complete(
    slot: &mut ConnectionSlot,
    attr_handle: u16,
    result: Result<(), BleError>,
) {
    if slot.notify_config_handle != Some(attr_handle) {
        return;
    }
    match result {
        Ok(()) => {
            info!("notifications enabled (dev={})", slot.name());
            slot.notify = NotifyState::Enabled;
        }
        Err(e) => {
            warn!("CCC write failed {} (dev={})", e, slot.name());
            slot.notify = NotifyState::Disabled;
        }
    }
}
