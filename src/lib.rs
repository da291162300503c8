//! Multi-peer BLE sensor receiver.
//!
//! Scans for environmental sensor transmitters, keeps up to
//! [`config::MAX_CONN`] of them connected at once, subscribes to their
//! sample characteristic and turns every notification into one CSV line.
//!
//! Everything in this library is `no_std` and allocation free so it runs
//! unchanged on the nRF52840 and on the host:
//!
//! Usage: `cargo test` (host) or
//! `cargo run --release --features embedded` (target, via probe-rs).
//!
//! The firmware binary (`main.rs`) wires [`ble::softdevice`] to a
//! [`ble::Coordinator`]; tests drive the coordinator with a mock host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod sample;

pub use error::{BleError, Error};
