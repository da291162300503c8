//! Service → characteristic → CCCD write cascade.

use blerx::ble::{CascadeState, GapEvent, HandleRange, NotifyState};
use blerx::config::{CCCD_NOTIFY_ENABLE, CHARACTERISTIC_UUID};
use blerx::BleError;

use crate::mock_host::*;

fn cascade<const N: usize>(c: &TestCoordinator<N>, handle: u16) -> (CascadeState, NotifyState) {
    let id = c.pool().find_by_handle(handle).unwrap();
    let slot = c.pool().get(id).unwrap();
    (slot.cascade(), slot.notify())
}

#[test]
fn full_cascade_subscribes() {
    let mut c = started::<4>();
    connect(&mut c, 1, 7);
    assert_eq!(cascade(&c, 7).0, CascadeState::ServicePending);

    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 7,
        service: SERVICE_RANGE,
    });
    assert_eq!(
        c.host().last_call(),
        Some(&HostCall::DiscoverCharacteristics {
            conn: 7,
            range: SERVICE_RANGE,
        })
    );
    assert_eq!(cascade(&c, 7).0, CascadeState::CharacteristicsPending);

    c.dispatch(GapEvent::CharacteristicDiscovered {
        handle: 7,
        uuid: CHARACTERISTIC_UUID,
        value_handle: VALUE_HANDLE,
    });
    assert_eq!(
        c.host().writes(),
        vec![(7, VALUE_HANDLE + 1, CCCD_NOTIFY_ENABLE)]
    );
    assert_eq!(
        cascade(&c, 7),
        (CascadeState::Subscribed, NotifyState::Unknown)
    );

    c.dispatch(GapEvent::WriteComplete {
        handle: 7,
        attr_handle: VALUE_HANDLE + 1,
        result: Ok(()),
    });
    assert_eq!(
        cascade(&c, 7),
        (CascadeState::Subscribed, NotifyState::Enabled)
    );

    let id = c.pool().find_by_handle(7).unwrap();
    let slot = c.pool().get(id).unwrap();
    assert_eq!(slot.value_handle(), Some(VALUE_HANDLE));
    assert_eq!(slot.notify_config_handle(), Some(VALUE_HANDLE + 1));
}

#[test]
fn missing_service_leaves_link_idle() {
    let mut c = started::<4>();
    connect(&mut c, 1, 7);
    c.host_mut().clear();

    c.dispatch(GapEvent::ServiceDiscoveryComplete { handle: 7 });

    assert_eq!(cascade(&c, 7).0, CascadeState::ServiceMissing);
    assert!(c.host().calls.is_empty());
    assert_eq!(c.pool().count_active(), 1);
}

#[test]
fn service_complete_after_discovery_is_a_no_op() {
    let mut c = started::<4>();
    connect(&mut c, 1, 7);
    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 7,
        service: SERVICE_RANGE,
    });
    c.dispatch(GapEvent::ServiceDiscoveryComplete { handle: 7 });
    assert_eq!(cascade(&c, 7).0, CascadeState::CharacteristicsPending);
}

#[test]
fn missing_characteristic_leaves_link_idle() {
    let mut c = started::<4>();
    connect(&mut c, 1, 7);
    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 7,
        service: SERVICE_RANGE,
    });
    c.dispatch(GapEvent::CharacteristicDiscovered {
        handle: 7,
        uuid: 0x2A00,
        value_handle: 0x0014,
    });
    c.dispatch(GapEvent::CharacteristicDiscoveryComplete { handle: 7 });

    assert_eq!(cascade(&c, 7).0, CascadeState::CharacteristicMissing);
    assert!(c.host().writes().is_empty());
}

#[test]
fn only_first_matching_characteristic_is_used() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 7);
    c.dispatch(GapEvent::CharacteristicDiscovered {
        handle: 7,
        uuid: CHARACTERISTIC_UUID,
        value_handle: 0x0018,
    });
    c.dispatch(GapEvent::CharacteristicDiscoveryComplete { handle: 7 });

    assert_eq!(c.host().writes().len(), 1);
    let id = c.pool().find_by_handle(7).unwrap();
    assert_eq!(c.pool().get(id).unwrap().value_handle(), Some(VALUE_HANDLE));
    assert_eq!(cascade(&c, 7).0, CascadeState::Subscribed);
}

#[test]
fn write_request_failure_disables_notify() {
    let mut c = started::<4>();
    c.host_mut().fail_write = Some(BleError::NotifyFailed);
    subscribe(&mut c, 1, 7);

    assert_eq!(
        cascade(&c, 7),
        (CascadeState::Subscribed, NotifyState::Disabled)
    );
    // Never retried.
    assert_eq!(c.host().writes().len(), 1);
    assert_eq!(c.pool().count_active(), 1);
}

#[test]
fn write_completion_failure_disables_notify() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 7);
    c.dispatch(GapEvent::WriteComplete {
        handle: 7,
        attr_handle: VALUE_HANDLE + 1,
        result: Err(BleError::Raw(0x0103)),
    });
    assert_eq!(cascade(&c, 7).1, NotifyState::Disabled);
}

#[test]
fn write_completion_for_other_attribute_is_ignored() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 7);
    c.dispatch(GapEvent::WriteComplete {
        handle: 7,
        attr_handle: 0x0030,
        result: Ok(()),
    });
    assert_eq!(cascade(&c, 7).1, NotifyState::Unknown);
}

#[test]
fn characteristic_discovery_start_failure_is_recorded() {
    let mut c = started::<4>();
    c.host_mut().fail_discover_characteristics = Some(BleError::Busy);
    connect(&mut c, 1, 7);
    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 7,
        service: SERVICE_RANGE,
    });
    assert_eq!(cascade(&c, 7).0, CascadeState::DiscoveryFailed);
}

#[test]
fn cascades_run_independently_per_link() {
    let mut c = started::<4>();
    subscribe(&mut c, 1, 1);
    connect(&mut c, 2, 2);
    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 2,
        service: HandleRange {
            start: 0x0030,
            end: 0x0040,
        },
    });

    assert_eq!(cascade(&c, 1).0, CascadeState::Subscribed);
    assert_eq!(cascade(&c, 2).0, CascadeState::CharacteristicsPending);
}

#[test]
fn events_for_unknown_handles_are_ignored() {
    let mut c = started::<4>();
    connect(&mut c, 1, 1);
    c.host_mut().clear();

    c.dispatch(GapEvent::ServiceDiscovered {
        handle: 42,
        service: SERVICE_RANGE,
    });
    c.dispatch(GapEvent::CharacteristicDiscovered {
        handle: 42,
        uuid: CHARACTERISTIC_UUID,
        value_handle: VALUE_HANDLE,
    });

    assert!(c.host().calls.is_empty());
    assert_eq!(cascade(&c, 1).0, CascadeState::ServicePending);
}
