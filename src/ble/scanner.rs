//! BLE GAP scan controller.
//!
//! Scanning is perpetual background behaviour: every pass that ends on its
//! own is restarted, and every connect/disconnect outcome asks for a scan
//! again. A scan is refused while one is already running, while any peer
//! is mid-connect, or while every slot is taken.
//!
//! The controller owns only the "scan active" flag. Everything else is
//! read from the [`SlotPool`] at decision time.

use core::fmt;

use crate::ble::{BleHost, ScanParams, SlotPool};
use crate::config::SCAN_PARAMS;
use crate::error::BleError;

/// Result of a [`ScanController::request_scan`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanOutcome {
    Started,
    AlreadyActive,
    BlockedConnecting,
    BlockedCapacity,
    Failed(BleError),
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Started => f.write_str("started"),
            ScanOutcome::AlreadyActive => f.write_str("already active"),
            ScanOutcome::BlockedConnecting => f.write_str("blocked (connecting)"),
            ScanOutcome::BlockedCapacity => f.write_str("blocked (max conn)"),
            ScanOutcome::Failed(e) => write!(f, "failed ({})", e),
        }
    }
}

pub struct ScanController {
    scanning: bool,
    params: ScanParams,
}

impl ScanController {
    pub const fn new() -> Self {
        Self::with_params(SCAN_PARAMS)
    }

    pub const fn with_params(params: ScanParams) -> Self {
        Self {
            scanning: false,
            params,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    /// Start a scan pass unless the policy forbids it.
    pub fn request_scan<H: BleHost, const N: usize>(
        &mut self,
        pool: &SlotPool<N>,
        host: &mut H,
    ) -> ScanOutcome {
        if self.scanning {
            debug!("scan already active");
            return ScanOutcome::AlreadyActive;
        }
        if pool.any_connecting() {
            debug!("scan blocked (connecting)");
            return ScanOutcome::BlockedConnecting;
        }
        if pool.is_full() {
            debug!("scan blocked (max conn={})", N);
            return ScanOutcome::BlockedCapacity;
        }

        match host.start_scan(&self.params) {
            Ok(()) => {
                self.scanning = true;
                info!("scan started (max_conn={})", N);
                ScanOutcome::Started
            }
            Err(e) => {
                warn!("scan failed {}", e);
                ScanOutcome::Failed(e)
            }
        }
    }

    /// A pass ended on its own: clear the flag and go again.
    pub fn on_scan_terminated<H: BleHost, const N: usize>(
        &mut self,
        pool: &SlotPool<N>,
        host: &mut H,
    ) -> ScanOutcome {
        self.scanning = false;
        debug!("scan complete");
        self.request_scan(pool, host)
    }

    /// Cancel the running scan right before a connect request.
    ///
    /// The flag is cleared even if the host reports a cancel failure.
    pub fn stop_for_connect_attempt<H: BleHost>(&mut self, host: &mut H) {
        if let Err(e) = host.cancel_scan() {
            warn!("scan cancel failed {}", e);
        }
        self.scanning = false;
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}
