//! Notification decoding and CSV emission.

use blerx::ble::{GapEvent, SlotId};
use blerx::config::RSSI_UNAVAILABLE;
use blerx::sample::{CSV_HEADER, SAMPLE_LEN};
use blerx::BleError;

use crate::mock_host::*;

const PAYLOAD: [u8; SAMPLE_LEN] = [
    42, 0, // seq
    0xD7, 0x00, 0xFF, // 215 * 10^-1
    0x59, 0x02, 0xFE, // 601 * 10^-2
    0x94, 0x27, 0x00, // 10132 * 10^0
];

fn records<const N: usize>(c: &TestCoordinator<N>) -> Vec<String> {
    csv_output(c)
        .lines()
        .skip(1)
        .map(str::to_owned)
        .collect()
}

#[test]
fn notification_emits_one_csv_line() {
    let mut c = started::<4>();
    subscribe(&mut c, 7, 3);

    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &PAYLOAD,
        hint: None,
    });

    assert_eq!(
        csv_output(&c),
        format!("{}\nRIOT-BLE-7,42,215,-1,601,-2,10132,0,-60\n", CSV_HEADER)
    );
}

#[test]
fn extra_bytes_are_ignored() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 3);
    let mut data = PAYLOAD.to_vec();
    data.extend_from_slice(&[0xEE; 5]);

    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &data,
        hint: None,
    });

    assert_eq!(records(&c), vec!["RIOT-BLE-1,42,215,-1,601,-2,10132,0,-60"]);
}

#[test]
fn short_payload_is_dropped() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 3);

    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &PAYLOAD[..SAMPLE_LEN - 1],
        hint: None,
    });
    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &[],
        hint: None,
    });

    assert!(records(&c).is_empty());
    assert_eq!(c.pool().count_active(), 1);
}

#[test]
fn notification_after_disconnect_is_dropped() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 3);
    let id = c.pool().find_by_handle(3).unwrap();
    c.dispatch(GapEvent::Disconnect {
        handle: 3,
        reason: 0x08,
        hint: Some(id),
    });

    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &PAYLOAD,
        hint: Some(id),
    });

    assert!(records(&c).is_empty());
}

#[test]
fn notification_for_unknown_handle_is_dropped() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 3);
    c.dispatch(GapEvent::Notification {
        handle: 4,
        data: &PAYLOAD,
        hint: None,
    });
    assert!(records(&c).is_empty());
}

#[test]
fn unreadable_rssi_reports_sentinel() {
    let mut c = started::<4>();
    subscribe(&mut c, 2, 3);
    c.host_mut().rssi = Err(BleError::Raw(0x3002));

    c.dispatch(GapEvent::Notification {
        handle: 3,
        data: &PAYLOAD,
        hint: None,
    });

    assert_eq!(
        records(&c),
        vec![format!("RIOT-BLE-2,42,215,-1,601,-2,10132,0,{}", RSSI_UNAVAILABLE)]
    );
}

#[test]
fn records_carry_the_sending_device() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 10);
    subscribe(&mut c, 2, 20);
    let mut second = PAYLOAD;
    second[0] = 43;

    c.dispatch(GapEvent::Notification {
        handle: 20,
        data: &second,
        hint: None,
    });
    c.dispatch(GapEvent::Notification {
        handle: 10,
        data: &PAYLOAD,
        hint: None,
    });

    assert_eq!(
        records(&c),
        vec![
            "RIOT-BLE-2,43,215,-1,601,-2,10132,0,-60",
            "RIOT-BLE-1,42,215,-1,601,-2,10132,0,-60",
        ]
    );
}

#[test]
fn stale_notification_hint_does_not_misattribute() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 10);
    subscribe(&mut c, 2, 20);
    let first = c.pool().find_by_handle(10).unwrap();

    c.dispatch(GapEvent::Notification {
        handle: 20,
        data: &PAYLOAD,
        hint: Some(first),
    });
    c.dispatch(GapEvent::Notification {
        handle: 20,
        data: &PAYLOAD,
        hint: Some(SlotId::from_index(9)),
    });

    let rows = records(&c);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.starts_with("RIOT-BLE-2,")));
}
