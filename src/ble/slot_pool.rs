//! Multi-peer connection slot pool.
//!
//! A fixed table of `N` slots, one per tracked peer. Slots move strictly
//! `Unused → Connecting → Connected → Unused`; allocation and release are
//! the only ways in and out of `Unused`.
//!
//! Callers hold a [`SlotId`] (an index), never a reference, across events.
//! Every event re-resolves its slot through the lookups here.

use core::fmt;

use heapless::String;

use crate::ble::adv_parser::truncated_name;
use crate::ble::gatt_client::{CascadeState, NotifyState};
use crate::ble::{ConnHandle, PeerAddress};
use crate::config::{DEVICE_NAME_MAX_LEN, MAX_CONN};
use crate::error::Error;

/// Index of a slot inside its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(usize);

impl SlotId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    Unused,
    Connecting,
    Connected,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotState::Unused => "unused",
            SlotState::Connecting => "connecting",
            SlotState::Connected => "connected",
        })
    }
}

/// Bookkeeping for one tracked peer.
#[derive(Clone, Debug)]
pub struct ConnectionSlot {
    pub(crate) state: SlotState,
    pub(crate) conn_handle: Option<ConnHandle>,
    pub(crate) value_handle: Option<u16>,
    pub(crate) notify_config_handle: Option<u16>,
    pub(crate) peer: PeerAddress,
    pub(crate) name: String<DEVICE_NAME_MAX_LEN>,
    pub(crate) cascade: CascadeState,
    pub(crate) notify: NotifyState,
}

impl ConnectionSlot {
    pub const fn empty() -> Self {
        Self {
            state: SlotState::Unused,
            conn_handle: None,
            value_handle: None,
            notify_config_handle: None,
            peer: PeerAddress::new(crate::ble::AddressKind::Public, [0; 6]),
            name: String::new(),
            cascade: CascadeState::Idle,
            notify: NotifyState::Unknown,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != SlotState::Unused
    }

    /// Peer address; `None` for an unused slot.
    pub fn peer(&self) -> Option<PeerAddress> {
        self.is_active().then_some(self.peer)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Only meaningful (and only `Some`) while connected.
    pub fn conn_handle(&self) -> Option<ConnHandle> {
        match self.state {
            SlotState::Connected => self.conn_handle,
            _ => None,
        }
    }

    /// Sample characteristic value handle, once discovered.
    pub fn value_handle(&self) -> Option<u16> {
        self.value_handle
    }

    /// CCCD handle derived from the value handle, once discovered.
    pub fn notify_config_handle(&self) -> Option<u16> {
        self.notify_config_handle
    }

    pub fn cascade(&self) -> CascadeState {
        self.cascade
    }

    pub fn notify(&self) -> NotifyState {
        self.notify
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fixed-capacity table of connection slots.
pub struct SlotPool<const N: usize = MAX_CONN> {
    slots: [ConnectionSlot; N],
}

impl<const N: usize> SlotPool<N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| ConnectionSlot::empty()),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Claim a free slot for `peer` in state `Connecting`.
    ///
    /// Returns `None` when the pool is full or `peer` is already tracked.
    pub fn allocate(&mut self, peer: PeerAddress, name: &[u8]) -> Option<SlotId> {
        self.try_allocate(peer, name).ok()
    }

    /// [`allocate`](Self::allocate) with the refusal reason.
    pub fn try_allocate(&mut self, peer: PeerAddress, name: &[u8]) -> Result<SlotId, Error> {
        if self.find_by_address(&peer).is_some() {
            return Err(Error::AlreadyTracked);
        }
        let index = self
            .slots
            .iter()
            .position(|s| !s.is_active())
            .ok_or(Error::PoolFull)?;

        let slot = &mut self.slots[index];
        *slot = ConnectionSlot::empty();
        slot.state = SlotState::Connecting;
        slot.peer = peer;
        slot.name = truncated_name(name);
        Ok(SlotId(index))
    }

    pub fn find_by_address(&self, peer: &PeerAddress) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.is_active() && s.peer == *peer)
            .map(SlotId)
    }

    /// Only connected slots carry a handle.
    pub fn find_by_handle(&self, handle: ConnHandle) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.state == SlotState::Connected && s.conn_handle == Some(handle))
            .map(SlotId)
    }

    /// Slot waiting for a connect outcome from `peer`.
    ///
    /// `hint` is used only if it names a `Connecting` slot for `peer`.
    pub fn resolve_pending(&self, hint: Option<SlotId>, peer: &PeerAddress) -> Option<SlotId> {
        let is_pending = |id: SlotId| {
            self.get(id)
                .is_some_and(|s| s.state == SlotState::Connecting && s.peer == *peer)
        };
        hint.filter(|&id| is_pending(id))
            .or_else(|| self.find_by_address(peer).filter(|&id| is_pending(id)))
    }

    /// Connected slot owning `handle`.
    ///
    /// `hint` is used only if it names the slot that owns `handle`.
    pub fn resolve_connected(&self, hint: Option<SlotId>, handle: ConnHandle) -> Option<SlotId> {
        hint.filter(|&id| self.get(id).is_some_and(|s| s.conn_handle() == Some(handle)))
            .or_else(|| self.find_by_handle(handle))
    }

    /// Active slot at `id`; `None` if out of range or unused.
    pub fn get(&self, id: SlotId) -> Option<&ConnectionSlot> {
        self.slots.get(id.0).filter(|s| s.is_active())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut ConnectionSlot> {
        self.slots.get_mut(id.0).filter(|s| s.is_active())
    }

    /// `Connecting → Connected`, recording the handle.
    pub fn mark_connected(&mut self, id: SlotId, handle: ConnHandle) -> Result<(), Error> {
        let slot = self.slots.get_mut(id.0).ok_or(Error::UnknownPeer)?;
        if slot.state != SlotState::Connecting {
            return Err(Error::InvalidTransition);
        }
        slot.state = SlotState::Connected;
        slot.conn_handle = Some(handle);
        Ok(())
    }

    /// Return a slot to `Unused` and clear it.
    ///
    /// Releasing an unused or out-of-range slot does nothing. Returns
    /// whether a tracked peer was actually freed.
    pub fn release(&mut self, id: SlotId) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot) if slot.is_active() => {
                *slot = ConnectionSlot::empty();
                true
            }
            _ => false,
        }
    }

    pub fn count_active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    pub fn any_connecting(&self) -> bool {
        self.slots.iter().any(|s| s.state == SlotState::Connecting)
    }

    pub fn is_full(&self) -> bool {
        self.count_active() >= N
    }

    /// Active slots with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &ConnectionSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_active())
            .map(|(i, s)| (SlotId(i), s))
    }
}

impl<const N: usize> Default for SlotPool<N> {
    fn default() -> Self {
        Self::new()
    }
}
