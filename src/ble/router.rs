//! Connection event router - the central state machine.
//!
//! One [`Coordinator`] owns the slot pool, the scan controller, the host
//! handle and the output sink. The host stack feeds it [`GapEvent`]s
//! through [`Coordinator::dispatch`], one at a time; each event runs to
//! completion before the next, so requests issued from inside a handler
//! (scan, connect, discovery) always see the state they just changed.
//!
//! A concurrent host must serialize `dispatch` calls (one task owning the
//! coordinator, or one mutex around it).

use heapless::String;

use crate::ble::adv_parser::{display_name, parse_fields};
use crate::ble::gatt_client;
use crate::ble::name_filter::name_matches;
use crate::ble::{
    BleHost, ConnHandle, ConnectionSlot, GapEvent, HandleRange, PeerAddress, ScanController,
    ScanOutcome, SlotId, SlotPool,
};
use crate::config::{
    CONNECT_TIMEOUT_MS, DEVICE_NAME_MAX_LEN, DISCONNECT_REASON_USER_TERMINATED, MAX_CONN,
    RSSI_UNAVAILABLE, SERVICE_UUID,
};
use crate::error::{BleError, Error};
use crate::sample::{RecordSink, Sample, SampleRecord, SAMPLE_LEN};

pub struct Coordinator<H, S, const N: usize = MAX_CONN> {
    host: H,
    sink: S,
    pool: SlotPool<N>,
    scanner: ScanController,
}

impl<H: BleHost, S: RecordSink, const N: usize> Coordinator<H, S, N> {
    pub fn new(host: H, sink: S) -> Self {
        Self::with_scanner(host, sink, ScanController::new())
    }

    pub fn with_scanner(host: H, sink: S, scanner: ScanController) -> Self {
        Self {
            host,
            sink,
            pool: SlotPool::new(),
            scanner,
        }
    }

    /// Write the CSV header and kick off the first scan.
    pub fn start(&mut self) -> ScanOutcome {
        self.sink.header();
        self.request_scan()
    }

    pub fn pool(&self) -> &SlotPool<N> {
        &self.pool
    }

    pub fn scanner(&self) -> &ScanController {
        &self.scanner
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn request_scan(&mut self) -> ScanOutcome {
        self.scanner.request_scan(&self.pool, &mut self.host)
    }

    /// Route one host event.
    pub fn dispatch(&mut self, event: GapEvent<'_>) {
        match event {
            GapEvent::Advertisement { peer, rssi, data } => self.on_advertisement(peer, rssi, data),
            GapEvent::ScanComplete => {
                self.scanner.on_scan_terminated(&self.pool, &mut self.host);
            }
            GapEvent::Connect { peer, result, hint } => match result {
                Ok(handle) => self.on_connected(peer, handle, hint),
                Err(e) => self.on_connect_failed(peer, e, hint),
            },
            GapEvent::Disconnect {
                handle,
                reason,
                hint,
            } => self.on_disconnected(handle, reason, hint),
            GapEvent::ServiceDiscovered { handle, service } => {
                self.on_service_discovered(handle, service)
            }
            GapEvent::ServiceDiscoveryComplete { handle } => {
                if let Some(slot) = self.connected_slot_mut(handle) {
                    gatt_client::on_service_discovery_complete(slot);
                }
            }
            GapEvent::CharacteristicDiscovered {
                handle,
                uuid,
                value_handle,
            } => self.on_characteristic_discovered(handle, uuid, value_handle),
            GapEvent::CharacteristicDiscoveryComplete { handle } => {
                if let Some(slot) = self.connected_slot_mut(handle) {
                    gatt_client::on_characteristic_discovery_complete(slot);
                }
            }
            GapEvent::WriteComplete {
                handle,
                attr_handle,
                result,
            } => {
                if let Some(slot) = self.connected_slot_mut(handle) {
                    gatt_client::on_write_complete(slot, attr_handle, result);
                }
            }
            GapEvent::Notification { handle, data, hint } => {
                // Dropped payloads never touch slot state.
                match self.on_notification(handle, data, hint) {
                    Ok(()) => {}
                    Err(Error::PayloadTooShort { len }) => {
                        warn!("short notify len={} (handle={})", len, handle)
                    }
                    Err(e) => debug!("notify dropped: {} (handle={})", e, handle),
                }
            }
        }
    }

    fn on_advertisement(&mut self, peer: PeerAddress, rssi: i8, data: &[u8]) {
        let fields = match parse_fields(data) {
            Ok(fields) => fields,
            Err(e) => {
                trace!("adv parse failed: {}", e);
                return;
            }
        };

        let uuid_match = fields.has_uuid16(SERVICE_UUID);
        let name_match = fields.name.is_some_and(name_matches);
        let name = display_name(fields.name);

        if uuid_match || fields.has_name() {
            trace!(
                "adv addr={} rssi={} name={} uuid={} name_match={}",
                peer,
                rssi,
                name.as_str(),
                uuid_match,
                name_match
            );
        }

        if !(uuid_match && name_match) {
            return;
        }

        if let Err(e) = self.start_connect(peer, fields.name.unwrap_or_default()) {
            debug!("skip {} ({})", name.as_str(), e);
        }
    }

    /// Claim a slot for `peer`, stop scanning and ask the host to connect.
    fn start_connect(&mut self, peer: PeerAddress, name: &[u8]) -> Result<(), Error> {
        let id = self.pool.try_allocate(peer, name)?;
        let slot_name = self.slot_name(id);
        info!("found {}, connecting...", slot_name.as_str());

        self.scanner.stop_for_connect_attempt(&mut self.host);

        if let Err(e) = self.host.connect(&peer, CONNECT_TIMEOUT_MS, id) {
            warn!("connect start failed {} (dev={})", e, slot_name.as_str());
            self.pool.release(id);
            self.request_scan();
        }
        Ok(())
    }

    fn on_connected(&mut self, peer: PeerAddress, handle: ConnHandle, hint: Option<SlotId>) {
        let Some(id) = self.pool.resolve_pending(hint, &peer) else {
            warn!("connected to untracked peer {} (handle={})", peer, handle);
            self.terminate(handle);
            self.request_scan();
            return;
        };

        if let Err(e) = self.pool.mark_connected(id, handle) {
            warn!("slot {} connect transition failed: {}", id.index(), e);
            self.terminate(handle);
            self.request_scan();
            return;
        }

        let cascade = match self.pool.get_mut(id) {
            Some(slot) => {
                info!(
                    "connected handle={} dev={} addr={}",
                    handle,
                    slot.name(),
                    peer
                );
                gatt_client::discover_and_subscribe(slot, &mut self.host)
            }
            None => Err(Error::UnknownPeer),
        };

        if let Err(e) = cascade {
            warn!("service discovery failed {} (handle={})", e, handle);
            // Slot is released when the Disconnect event arrives.
            self.terminate(handle);
        }

        self.request_scan();
    }

    fn on_connect_failed(&mut self, peer: PeerAddress, error: BleError, hint: Option<SlotId>) {
        info!("connect failed {} addr={}", error, peer);
        if let Some(id) = self.pool.resolve_pending(hint, &peer) {
            self.pool.release(id);
        }
        self.request_scan();
    }

    fn on_disconnected(&mut self, handle: ConnHandle, reason: u8, hint: Option<SlotId>) {
        match self.pool.resolve_connected(hint, handle) {
            Some(id) => {
                let name = self.slot_name(id);
                info!(
                    "disconnected reason={} handle={} dev={}",
                    reason,
                    handle,
                    name.as_str()
                );
                self.pool.release(id);
            }
            None => info!("disconnected reason={} handle={} (untracked)", reason, handle),
        }
        self.request_scan();
    }

    fn on_service_discovered(&mut self, handle: ConnHandle, service: HandleRange) {
        let Some(id) = self.pool.find_by_handle(handle) else {
            return;
        };
        if let Some(slot) = self.pool.get_mut(id) {
            gatt_client::on_service_discovered(slot, &mut self.host, service);
        }
    }

    fn on_characteristic_discovered(&mut self, handle: ConnHandle, uuid: u16, value_handle: u16) {
        let Some(id) = self.pool.find_by_handle(handle) else {
            return;
        };
        if let Some(slot) = self.pool.get_mut(id) {
            gatt_client::on_characteristic_discovered(slot, &mut self.host, uuid, value_handle);
        }
    }

    /// Decode one notification and emit its CSV record.
    fn on_notification(
        &mut self,
        handle: ConnHandle,
        data: &[u8],
        hint: Option<SlotId>,
    ) -> Result<(), Error> {
        if data.len() < SAMPLE_LEN {
            return Err(Error::PayloadTooShort { len: data.len() });
        }

        let id = self
            .pool
            .resolve_connected(hint, handle)
            .ok_or(Error::UnknownPeer)?;
        let sample = Sample::from_ble_bytes(data).ok_or(Error::PayloadTooShort { len: data.len() })?;
        let rssi = self.host.read_rssi(handle).unwrap_or(RSSI_UNAVAILABLE);

        let slot = self.pool.get(id).ok_or(Error::UnknownPeer)?;
        self.sink.record(&SampleRecord {
            device: slot.name(),
            sample,
            rssi,
        });
        Ok(())
    }

    fn connected_slot_mut(&mut self, handle: ConnHandle) -> Option<&mut ConnectionSlot> {
        let id = self.pool.find_by_handle(handle)?;
        self.pool.get_mut(id)
    }

    fn slot_name(&self, id: SlotId) -> String<DEVICE_NAME_MAX_LEN> {
        self.pool
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn terminate(&mut self, handle: ConnHandle) {
        if let Err(e) = self.host.terminate(handle, DISCONNECT_REASON_USER_TERMINATED) {
            warn!("terminate failed {} (handle={})", e, handle);
        }
    }
}
