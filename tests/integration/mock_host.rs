//! Mock BLE host for integration tests.
//!
//! Records every request so tests can assert on the full call history,
//! and can be told to reject any class of request.

use blerx::ble::{
    AddressKind, BleHost, ConnHandle, Coordinator, GapEvent, HandleRange, PeerAddress,
    ScanParams, SlotId,
};
use blerx::config::{CHARACTERISTIC_UUID, SERVICE_UUID};
use blerx::sample::CsvWriter;
use blerx::BleError;

// ── Host call record ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    StartScan(ScanParams),
    CancelScan,
    Connect {
        peer: PeerAddress,
        timeout_ms: u32,
        context: SlotId,
    },
    Terminate {
        conn: ConnHandle,
        reason: u8,
    },
    DiscoverService {
        conn: ConnHandle,
        uuid: u16,
    },
    DiscoverCharacteristics {
        conn: ConnHandle,
        range: HandleRange,
    },
    Write {
        conn: ConnHandle,
        attr_handle: u16,
        value: [u8; 2],
    },
}

// ── MockHost ──────────────────────────────────────────────────

pub struct MockHost {
    pub calls: Vec<HostCall>,
    pub fail_start_scan: Option<BleError>,
    pub fail_cancel_scan: Option<BleError>,
    pub fail_connect: Option<BleError>,
    pub fail_discover_service: Option<BleError>,
    pub fail_discover_characteristics: Option<BleError>,
    pub fail_write: Option<BleError>,
    pub rssi: Result<i8, BleError>,
}

#[allow(dead_code)]
impl MockHost {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            fail_start_scan: None,
            fail_cancel_scan: None,
            fail_connect: None,
            fail_discover_service: None,
            fail_discover_characteristics: None,
            fail_write: None,
            rssi: Ok(-60),
        }
    }

    pub fn last_call(&self) -> Option<&HostCall> {
        self.calls.last()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn scan_starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HostCall::StartScan(_)))
            .count()
    }

    /// Context handed to the most recent connect request.
    pub fn last_connect_context(&self) -> Option<SlotId> {
        self.calls.iter().rev().find_map(|c| match c {
            HostCall::Connect { context, .. } => Some(*context),
            _ => None,
        })
    }

    pub fn terminated(&self) -> Vec<ConnHandle> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Terminate { conn, .. } => Some(*conn),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(ConnHandle, u16, [u8; 2])> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Write {
                    conn,
                    attr_handle,
                    value,
                } => Some((*conn, *attr_handle, *value)),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome(fail: Option<BleError>) -> Result<(), BleError> {
    match fail {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl BleHost for MockHost {
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        self.calls.push(HostCall::StartScan(*params));
        outcome(self.fail_start_scan)
    }

    fn cancel_scan(&mut self) -> Result<(), BleError> {
        self.calls.push(HostCall::CancelScan);
        outcome(self.fail_cancel_scan)
    }

    fn connect(
        &mut self,
        peer: &PeerAddress,
        timeout_ms: u32,
        context: SlotId,
    ) -> Result<(), BleError> {
        self.calls.push(HostCall::Connect {
            peer: *peer,
            timeout_ms,
            context,
        });
        outcome(self.fail_connect)
    }

    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), BleError> {
        self.calls.push(HostCall::Terminate { conn, reason });
        Ok(())
    }

    fn discover_service_by_uuid(&mut self, conn: ConnHandle, uuid: u16) -> Result<(), BleError> {
        self.calls.push(HostCall::DiscoverService { conn, uuid });
        outcome(self.fail_discover_service)
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), BleError> {
        self.calls
            .push(HostCall::DiscoverCharacteristics { conn, range });
        outcome(self.fail_discover_characteristics)
    }

    fn write_attribute(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        value: [u8; 2],
    ) -> Result<(), BleError> {
        self.calls.push(HostCall::Write {
            conn,
            attr_handle,
            value,
        });
        outcome(self.fail_write)
    }

    fn read_rssi(&mut self, _conn: ConnHandle) -> Result<i8, BleError> {
        self.rssi
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub type TestCoordinator<const N: usize> = Coordinator<MockHost, CsvWriter<String>, N>;

pub const SERVICE_RANGE: HandleRange = HandleRange {
    start: 0x0010,
    end: 0x0020,
};

pub const VALUE_HANDLE: u16 = 0x0012;

/// Started coordinator (header written, first scan issued).
pub fn started<const N: usize>() -> TestCoordinator<N> {
    let mut coordinator: TestCoordinator<N> =
        Coordinator::new(MockHost::new(), CsvWriter::new(String::new()));
    coordinator.start();
    coordinator
}

pub fn peer(n: u8) -> PeerAddress {
    PeerAddress::new(AddressKind::Random, [n, 0x22, 0x33, 0x44, 0x55, 0xC6])
}

/// Flags, a complete 16-bit UUID list and a complete local name.
pub fn adv_data(name: &str, uuid: u16) -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06, 0x03, 0x03];
    data.extend_from_slice(&uuid.to_le_bytes());
    data.push(name.len() as u8 + 1);
    data.push(0x09);
    data.extend_from_slice(name.as_bytes());
    data
}

pub fn sensor_name(n: u8) -> String {
    format!("RIOT-BLE-{}", n)
}

/// Advertisement from sensor `n` that passes both filters.
pub fn advertise<const N: usize>(c: &mut TestCoordinator<N>, n: u8) {
    let data = adv_data(&sensor_name(n), SERVICE_UUID);
    c.dispatch(GapEvent::Advertisement {
        peer: peer(n),
        rssi: -50,
        data: &data,
    });
}

/// Advertise and accept the connection of sensor `n` on `handle`.
pub fn connect<const N: usize>(c: &mut TestCoordinator<N>, n: u8, handle: ConnHandle) {
    advertise(c, n);
    let hint = c.host().last_connect_context();
    c.dispatch(GapEvent::Connect {
        peer: peer(n),
        result: Ok(handle),
        hint,
    });
}

/// Connect sensor `n` and run the cascade up to the CCCD write.
pub fn subscribe<const N: usize>(c: &mut TestCoordinator<N>, n: u8, handle: ConnHandle) {
    connect(c, n, handle);
    c.dispatch(GapEvent::ServiceDiscovered {
        handle,
        service: SERVICE_RANGE,
    });
    c.dispatch(GapEvent::CharacteristicDiscovered {
        handle,
        uuid: CHARACTERISTIC_UUID,
        value_handle: VALUE_HANDLE,
    });
}

/// Everything the sink wrote, header included.
pub fn csv_output<const N: usize>(c: &TestCoordinator<N>) -> &str {
    c.sink().get_ref().as_str()
}
