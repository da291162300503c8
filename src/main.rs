//! blerx firmware - nRF52840 + SoftDevice S140.
//!
//! Boots the Embassy executor, enables the SoftDevice in central role with
//! one link per slot, spawns the radio tasks and then runs the coordinator
//! on the main task: every host event is dispatched in arrival order and
//! each CSV line goes out over defmt-rtt.

#![no_std]
#![no_main]

use core::mem;

use defmt::info;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::interrupt::Priority;
use nrf_softdevice::{raw, Softdevice};
use panic_probe as _;

use blerx::ble::softdevice::{self, SoftdeviceHost, HOST_EVENTS};
use blerx::ble::Coordinator;
use blerx::config::MAX_CONN;
use blerx::sample::DefmtSink;

const DEVICE_NAME: &[u8] = b"blerx";

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_CONN as u8,
            event_length: 6,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: MAX_CONN as u8,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("blerx booting (max_conn={})", MAX_CONN);

    // SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(config);

    let sd: &'static Softdevice = Softdevice::enable(&softdevice_config());
    spawner.must_spawn(softdevice_task(sd));
    spawner.must_spawn(softdevice::scan_task(sd));
    for link in 0..MAX_CONN {
        spawner.must_spawn(softdevice::link_task(sd, link));
    }

    let mut coordinator: Coordinator<SoftdeviceHost, DefmtSink> =
        Coordinator::new(SoftdeviceHost::new(), DefmtSink);
    let outcome = coordinator.start();
    info!("first scan: {}", outcome);

    loop {
        let event = HOST_EVENTS.receive().await;
        coordinator.dispatch(event.as_gap_event());
    }
}
