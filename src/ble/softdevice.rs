//! Nordic SoftDevice S140 host adapter.
//!
//! Implements [`BleHost`] over nrf-softdevice's async central API:
//!
//! - [`scan_task`] runs one scan pass per `Start` command and reports
//!   every advertisement plus a final `ScanComplete`.
//! - One [`link_task`] per slot index connects, runs GATT discovery and
//!   the CCCD write on request, and forwards notifications until the
//!   link drops.
//!
//! [`SoftdeviceHost`] only enqueues commands, so every `BleHost` call
//! returns immediately. Outcomes come back through [`HOST_EVENTS`], which
//! the coordinator task drains with [`HostEvent::as_gap_event`].

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{
    self, Characteristic, Client, Descriptor, DiscoverError, HvxType,
};
use nrf_softdevice::ble::{central, Address, AddressType, Connection, Uuid};
use nrf_softdevice::{raw, Softdevice};

use crate::ble::{
    AddressKind, BleHost, ConnHandle, GapEvent, HandleRange, PeerAddress, ScanParams, SlotId,
};
use crate::config::{CHARACTERISTIC_UUID, MAX_CONN, SERVICE_UUID};
use crate::error::BleError;

/// Legacy advertising payload size.
pub const ADV_DATA_MAX: usize = 31;

/// Notification bytes kept per event. Longer payloads are cut here.
pub const NOTIFY_DATA_MAX: usize = 32;

pub const EVENT_QUEUE_LEN: usize = 16;

/// The SoftDevice wrapper does not surface the HCI disconnect reason.
pub const REASON_NOT_REPORTED: u8 = 0xFF;

/// Pause before reporting a scan that ended in error, so a persistent
/// fault does not spin the coordinator.
const SCAN_ERROR_BACKOFF_MS: u64 = 500;

/// Sample characteristics remembered per discovery.
const MAX_SAMPLE_CHARS: usize = 4;

/// Owned copy of a [`GapEvent`], queued from the radio tasks.
#[derive(Clone, Debug)]
pub enum HostEvent {
    Advertisement {
        peer: PeerAddress,
        rssi: i8,
        data: Vec<u8, ADV_DATA_MAX>,
    },
    ScanComplete,
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
    ServiceDiscovered {
        handle: ConnHandle,
        service: HandleRange,
    },
    ServiceDiscoveryComplete {
        handle: ConnHandle,
    },
    CharacteristicDiscovered {
        handle: ConnHandle,
        uuid: u16,
        value_handle: u16,
    },
    CharacteristicDiscoveryComplete {
        handle: ConnHandle,
    },
    WriteComplete {
        handle: ConnHandle,
        attr_handle: u16,
        result: Result<(), BleError>,
    },
    Notification {
        handle: ConnHandle,
        data: Vec<u8, NOTIFY_DATA_MAX>,
        hint: Option<SlotId>,
    },
}

impl HostEvent {
    pub fn as_gap_event(&self) -> GapEvent<'_> {
        match self {
            HostEvent::Advertisement { peer, rssi, data } => GapEvent::Advertisement {
                peer: *peer,
                rssi: *rssi,
                data,
            },
            HostEvent::ScanComplete => GapEvent::ScanComplete,
            HostEvent::Connect { peer, result, hint } => GapEvent::Connect {
                peer: *peer,
                result: *result,
                hint: *hint,
            },
            HostEvent::Disconnect {
                handle,
                reason,
                hint,
            } => GapEvent::Disconnect {
                handle: *handle,
                reason: *reason,
                hint: *hint,
            },
            HostEvent::ServiceDiscovered { handle, service } => GapEvent::ServiceDiscovered {
                handle: *handle,
                service: *service,
            },
            HostEvent::ServiceDiscoveryComplete { handle } => {
                GapEvent::ServiceDiscoveryComplete { handle: *handle }
            }
            HostEvent::CharacteristicDiscovered {
                handle,
                uuid,
                value_handle,
            } => GapEvent::CharacteristicDiscovered {
                handle: *handle,
                uuid: *uuid,
                value_handle: *value_handle,
            },
            HostEvent::CharacteristicDiscoveryComplete { handle } => {
                GapEvent::CharacteristicDiscoveryComplete { handle: *handle }
            }
            HostEvent::WriteComplete {
                handle,
                attr_handle,
                result,
            } => GapEvent::WriteComplete {
                handle: *handle,
                attr_handle: *attr_handle,
                result: *result,
            },
            HostEvent::Notification { handle, data, hint } => GapEvent::Notification {
                handle: *handle,
                data,
                hint: *hint,
            },
        }
    }
}

#[derive(Clone, Copy)]
enum ScanCommand {
    Start(ScanParams),
    Cancel,
}

#[derive(Clone, Copy)]
enum LinkCommand {
    Connect { peer: PeerAddress, timeout_ms: u32 },
    DiscoverService,
    DiscoverCharacteristics(HandleRange),
    Write { attr_handle: u16, value: [u8; 2] },
    Terminate,
}

/// What the host side may read about a link without awaiting.
#[derive(Clone, Copy)]
struct LinkInfo {
    handle: Option<ConnHandle>,
    rssi: Option<i8>,
}

impl LinkInfo {
    const IDLE: Self = Self {
        handle: None,
        rssi: None,
    };
}

pub static HOST_EVENTS: Channel<CriticalSectionRawMutex, HostEvent, EVENT_QUEUE_LEN> =
    Channel::new();

static SCAN_COMMANDS: Channel<CriticalSectionRawMutex, ScanCommand, 2> = Channel::new();

static LINK_COMMANDS: [Channel<CriticalSectionRawMutex, LinkCommand, 4>; MAX_CONN] =
    [const { Channel::new() }; MAX_CONN];

static LINKS: BlockingMutex<CriticalSectionRawMutex, Cell<[LinkInfo; MAX_CONN]>> =
    BlockingMutex::new(Cell::new([LinkInfo::IDLE; MAX_CONN]));

/// Held while the radio scans or initiates; the SoftDevice allows only one.
static RADIO: Mutex<CriticalSectionRawMutex, ()> = Mutex::new(());

fn update_link(link: usize, f: impl FnOnce(&mut LinkInfo)) {
    LINKS.lock(|cell| {
        let mut links = cell.get();
        if let Some(info) = links.get_mut(link) {
            f(info);
        }
        cell.set(links);
    });
}

fn find_link(handle: ConnHandle) -> Option<(usize, LinkInfo)> {
    LINKS.lock(|cell| {
        cell.get()
            .iter()
            .copied()
            .enumerate()
            .find(|(_, info)| info.handle == Some(handle))
    })
}

fn record_rssi(handle: ConnHandle, rssi: Option<i8>) {
    if let Some((link, _)) = find_link(handle) {
        update_link(link, |info| info.rssi = rssi);
    }
}

fn peer_from_raw(addr: &raw::ble_gap_addr_t) -> PeerAddress {
    let public = addr.addr_type() as u32 == raw::BLE_GAP_ADDR_TYPE_PUBLIC;
    let kind = match (addr.addr_id_peer() != 0, public) {
        (true, true) => AddressKind::PublicIdentity,
        (true, false) => AddressKind::RandomIdentity,
        (false, true) => AddressKind::Public,
        (false, false) => AddressKind::Random,
    };
    PeerAddress::new(kind, addr.addr)
}

fn to_address(peer: &PeerAddress) -> Address {
    let address_type = match peer.kind {
        AddressKind::Public | AddressKind::PublicIdentity => AddressType::Public,
        // Sensors advertise with static random addresses.
        AddressKind::Random | AddressKind::RandomIdentity => AddressType::RandomStatic,
    };
    Address::new(address_type, peer.bytes)
}

/// SoftDevice timeouts are in 10 ms units.
fn to_10ms_units(ms: u32) -> u16 {
    u16::try_from(ms / 10).unwrap_or(u16::MAX)
}

async fn emit(event: HostEvent) {
    HOST_EVENTS.send(event).await;
}

// ── Host handle ───────────────────────────────────────────────

/// [`BleHost`] handle owned by the coordinator task.
pub struct SoftdeviceHost {
    _private: (),
}

impl SoftdeviceHost {
    pub const fn new() -> Self {
        Self { _private: () }
    }

    fn send_to_handle(&self, conn: ConnHandle, cmd: LinkCommand) -> Result<(), BleError> {
        let (link, _) = find_link(conn)
            .ok_or(BleError::Raw(raw::BLE_ERROR_INVALID_CONN_HANDLE as i32))?;
        send_to_link(link, cmd)
    }
}

impl Default for SoftdeviceHost {
    fn default() -> Self {
        Self::new()
    }
}

fn send_to_link(link: usize, cmd: LinkCommand) -> Result<(), BleError> {
    LINK_COMMANDS
        .get(link)
        .ok_or(BleError::Busy)?
        .try_send(cmd)
        .map_err(|_| BleError::Busy)
}

impl BleHost for SoftdeviceHost {
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        SCAN_COMMANDS
            .try_send(ScanCommand::Start(*params))
            .map_err(|_| BleError::Busy)
    }

    fn cancel_scan(&mut self) -> Result<(), BleError> {
        SCAN_COMMANDS
            .try_send(ScanCommand::Cancel)
            .map_err(|_| BleError::Busy)
    }

    /// Slot `context` is served by link task `context.index()`.
    fn connect(
        &mut self,
        peer: &PeerAddress,
        timeout_ms: u32,
        context: SlotId,
    ) -> Result<(), BleError> {
        send_to_link(
            context.index(),
            LinkCommand::Connect {
                peer: *peer,
                timeout_ms,
            },
        )
    }

    /// nrf-softdevice always disconnects with "remote user terminated".
    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), BleError> {
        debug!("terminate handle={} reason={}", conn, reason);
        self.send_to_handle(conn, LinkCommand::Terminate)
    }

    fn discover_service_by_uuid(&mut self, conn: ConnHandle, uuid: u16) -> Result<(), BleError> {
        if uuid != SERVICE_UUID {
            return Err(BleError::DiscoveryFailed);
        }
        self.send_to_handle(conn, LinkCommand::DiscoverService)
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), BleError> {
        self.send_to_handle(conn, LinkCommand::DiscoverCharacteristics(range))
    }

    fn write_attribute(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        value: [u8; 2],
    ) -> Result<(), BleError> {
        self.send_to_handle(conn, LinkCommand::Write { attr_handle, value })
    }

    /// Last value sampled when a notification arrived on this link.
    fn read_rssi(&mut self, conn: ConnHandle) -> Result<i8, BleError> {
        let (_, info) = find_link(conn)
            .ok_or(BleError::Raw(raw::BLE_ERROR_INVALID_CONN_HANDLE as i32))?;
        info.rssi.ok_or(BleError::Busy)
    }
}

// ── Scanning ──────────────────────────────────────────────────

fn forward_advertisement(report: &raw::ble_gap_evt_adv_report_t) {
    let data = unsafe { core::slice::from_raw_parts(report.data.p_data, report.data.len as usize) };
    let Ok(data) = Vec::from_slice(data) else {
        trace!("adv too long ({} bytes)", data.len());
        return;
    };
    let event = HostEvent::Advertisement {
        peer: peer_from_raw(&report.peer_addr),
        rssi: report.rssi,
        data,
    };
    if HOST_EVENTS.try_send(event).is_err() {
        trace!("event queue full, adv dropped");
    }
}

/// Runs scan passes on request. Duplicate filtering is left to the
/// coordinator, which ignores peers it already tracks.
#[embassy_executor::task]
pub async fn scan_task(sd: &'static Softdevice) -> ! {
    let mut pending: Option<ScanCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => SCAN_COMMANDS.receive().await,
        };
        let ScanCommand::Start(params) = cmd else {
            continue;
        };

        let config = central::ScanConfig {
            interval: params.interval.into(),
            window: params.window.into(),
            active: !params.passive,
            timeout: to_10ms_units(params.duration_ms),
            ..Default::default()
        };

        let radio = RADIO.lock().await;
        let outcome = select(
            central::scan(sd, &config, |report| {
                forward_advertisement(report);
                None::<()>
            }),
            SCAN_COMMANDS.receive(),
        )
        .await;
        drop(radio);

        match outcome {
            Either::First(Err(central::ScanError::Timeout)) | Either::First(Ok(())) => {
                emit(HostEvent::ScanComplete).await;
            }
            Either::First(Err(_)) => {
                warn!("scan aborted by the stack");
                Timer::after(Duration::from_millis(SCAN_ERROR_BACKOFF_MS)).await;
                emit(HostEvent::ScanComplete).await;
            }
            Either::Second(ScanCommand::Cancel) => debug!("scan cancelled"),
            // Restart with the new parameters.
            Either::Second(next @ ScanCommand::Start(_)) => pending = Some(next),
        }
    }
}

// ── Links ─────────────────────────────────────────────────────

/// GATT client for the sample service. Discovery only records where the
/// sample characteristics live; the coordinator drives the rest.
pub struct SampleClient {
    link: Option<usize>,
    range: Option<HandleRange>,
    characteristics: Vec<u16, MAX_SAMPLE_CHARS>,
}

impl SampleClient {
    fn hint(&self) -> Option<SlotId> {
        self.link.map(SlotId::from_index)
    }
}

impl Client for SampleClient {
    type Event = HostEvent;

    fn on_hvx(
        &self,
        conn: &Connection,
        type_: HvxType,
        _attr_handle: u16,
        data: &[u8],
    ) -> Option<HostEvent> {
        if !matches!(type_, HvxType::Notification) {
            return None;
        }
        let handle = conn.handle()?;
        record_rssi(handle, conn.rssi());

        let len = data.len().min(NOTIFY_DATA_MAX);
        let data = Vec::from_slice(&data[..len]).ok()?;
        Some(HostEvent::Notification {
            handle,
            data,
            hint: self.hint(),
        })
    }

    fn uuid() -> Uuid {
        Uuid::new_16(SERVICE_UUID)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            link: None,
            range: None,
            characteristics: Vec::new(),
        }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &Characteristic,
        descriptors: &[Descriptor],
    ) {
        let last = descriptors
            .iter()
            .map(|d| d.handle)
            .fold(characteristic.handle_value, u16::max);
        // The service declaration sits right before its first characteristic.
        let first = characteristic.handle_decl.saturating_sub(1);
        self.range = Some(match self.range {
            Some(r) => HandleRange {
                start: r.start.min(first),
                end: r.end.max(last),
            },
            None => HandleRange {
                start: first,
                end: last,
            },
        });

        if characteristic.uuid == Some(Uuid::new_16(CHARACTERISTIC_UUID))
            && self.characteristics.push(characteristic.handle_value).is_err()
        {
            debug!("extra sample characteristic ignored");
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

async fn connect(
    sd: &Softdevice,
    peer: &PeerAddress,
    timeout_ms: u32,
) -> Result<Connection, BleError> {
    let address = to_address(peer);
    let whitelist = [&address];
    let config = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            timeout: to_10ms_units(timeout_ms),
            ..Default::default()
        },
        ..Default::default()
    };

    let _radio = RADIO.lock().await;
    central::connect(sd, &config).await.map_err(|e| match e {
        central::ConnectError::Timeout => BleError::Timeout,
        central::ConnectError::NoFreeConn => BleError::Busy,
        _ => BleError::ConnectFailed,
    })
}

/// One connection at a time for slot index `link`.
#[embassy_executor::task(pool_size = MAX_CONN)]
pub async fn link_task(sd: &'static Softdevice, link: usize) -> ! {
    let commands = &LINK_COMMANDS[link];
    let hint = Some(SlotId::from_index(link));

    loop {
        let LinkCommand::Connect { peer, timeout_ms } = commands.receive().await else {
            continue;
        };

        let conn = match connect(sd, &peer, timeout_ms).await {
            Ok(conn) => conn,
            Err(e) => {
                emit(HostEvent::Connect {
                    peer,
                    result: Err(e),
                    hint,
                })
                .await;
                continue;
            }
        };
        let Some(handle) = conn.handle() else {
            emit(HostEvent::Connect {
                peer,
                result: Err(BleError::ConnectFailed),
                hint,
            })
            .await;
            continue;
        };

        conn.start_rssi();
        update_link(link, |info| {
            *info = LinkInfo {
                handle: Some(handle),
                rssi: None,
            }
        });
        emit(HostEvent::Connect {
            peer,
            result: Ok(handle),
            hint,
        })
        .await;

        serve(&conn, link, handle).await;

        update_link(link, |info| *info = LinkInfo::IDLE);
        emit(HostEvent::Disconnect {
            handle,
            reason: REASON_NOT_REPORTED,
            hint,
        })
        .await;
    }
}

/// Execute link commands and forward notifications until disconnect.
async fn serve(conn: &Connection, link: usize, handle: ConnHandle) {
    let commands = &LINK_COMMANDS[link];
    let mut client = SampleClient::new_undiscovered(conn.clone());
    client.link = Some(link);

    loop {
        let next = select(
            commands.receive(),
            gatt_client::run(conn, &client, |event| {
                if HOST_EVENTS.try_send(event).is_err() {
                    warn!("event queue full, notify dropped (handle={})", handle);
                }
            }),
        )
        .await;
        let cmd = match next {
            Either::First(cmd) => cmd,
            Either::Second(_) => return,
        };

        match cmd {
            LinkCommand::DiscoverService => {
                match gatt_client::discover::<SampleClient>(conn).await {
                    Ok(mut found) => {
                        found.link = Some(link);
                        if let Some(service) = found.range {
                            emit(HostEvent::ServiceDiscovered { handle, service }).await;
                        }
                        client = found;
                    }
                    Err(DiscoverError::ServiceNotFound) => {}
                    Err(_) => warn!("service discovery error (handle={})", handle),
                }
                emit(HostEvent::ServiceDiscoveryComplete { handle }).await;
            }
            LinkCommand::DiscoverCharacteristics(range) => {
                for &value_handle in client.characteristics.iter() {
                    if (range.start..=range.end).contains(&value_handle) {
                        emit(HostEvent::CharacteristicDiscovered {
                            handle,
                            uuid: CHARACTERISTIC_UUID,
                            value_handle,
                        })
                        .await;
                    }
                }
                emit(HostEvent::CharacteristicDiscoveryComplete { handle }).await;
            }
            LinkCommand::Write { attr_handle, value } => {
                let result = gatt_client::write(conn, attr_handle, &value)
                    .await
                    .map_err(|_| BleError::NotifyFailed);
                emit(HostEvent::WriteComplete {
                    handle,
                    attr_handle,
                    result,
                })
                .await;
            }
            LinkCommand::Terminate => {
                if conn.disconnect().is_err() {
                    return;
                }
            }
            LinkCommand::Connect { .. } => warn!("link {} busy, connect ignored", link),
        }
    }
}
