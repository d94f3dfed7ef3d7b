//! Bus configuration and the process wide defaults
//!
//! A [`BusConfig`] is read exactly once, when a bus is opened. Changing it
//! afterwards doesn't touch buses that are already open.
//!
//! The defaults used by [`Bus::open`][super::Bus::open] are global to the
//! process. [`set_baudrate`] and [`set_timeout`] may be called at any time and
//! apply to every open that happens afterwards. To stay independent of them,
//! build a [`BusConfig`] and use [`Bus::open_with`][super::Bus::open_with].

use super::{BusError, BusResult};
use crate::util::ensure;
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

/// Speed every SimpleMotion device starts with after reset
pub const DEFAULT_BAUDRATE: u32 = 460_800;

/// Reply timeout used unless configured otherwise
pub const DEFAULT_TIMEOUT_MS: u16 = 500;

/// Longest reply timeout that can be configured
pub const MAX_TIMEOUT_MS: u16 = 5000;

/// Granularity of the reply timeout on this platform. Timeouts are rounded
/// down to a multiple of it, so on unix 99 ms or less gives a 0 ms timeout.
#[cfg(unix)]
pub const TIMEOUT_RESOLUTION_MS: u16 = 100;
/// Granularity of the reply timeout on this platform. Timeouts are rounded
/// down to a multiple of it.
#[cfg(not(unix))]
pub const TIMEOUT_RESOLUTION_MS: u16 = 1;

/// Settings a bus is opened with
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct BusConfig {
    baudrate: u32,
    timeout_ms: u16,
}

impl BusConfig {
    /// Returns the configuration with the library defaults, 460800 bps and
    /// a 500 ms timeout
    pub const fn new() -> Self {
        BusConfig {
            baudrate: DEFAULT_BAUDRATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.into())
    }

    pub fn set_baudrate(&mut self, bps: u32) -> BusResult<()> {
        ensure!(bps > 0, BusError::InvalidBaudrate(bps));
        self.baudrate = bps;
        Ok(())
    }

    /// Sets the reply timeout in milliseconds, rounded down to
    /// [`TIMEOUT_RESOLUTION_MS`].
    ///
    /// # Errors
    /// Returns [`BusError::InvalidTimeout`] if `millis` exceeds
    /// [`MAX_TIMEOUT_MS`], the previous timeout is kept in that case.
    pub fn set_timeout(&mut self, millis: u16) -> BusResult<()> {
        ensure!(millis <= MAX_TIMEOUT_MS, BusError::InvalidTimeout(millis));
        self.timeout_ms = millis - millis % TIMEOUT_RESOLUTION_MS;
        Ok(())
    }

    pub fn with_baudrate(mut self, bps: u32) -> BusResult<Self> {
        self.set_baudrate(bps)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, millis: u16) -> BusResult<Self> {
        self.set_timeout(millis)?;
        Ok(self)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

//

// the process wide defaults, read by every open that doesn't get an explicit
// config
static DEFAULTS: Mutex<BusConfig> = Mutex::new(BusConfig::new());

fn with_defaults<T>(f: impl FnOnce(&mut BusConfig) -> T) -> T {
    // a poisoned lock can't leave a Copy config half written
    let mut defaults = DEFAULTS.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut defaults)
}

/// Returns a snapshot of the process wide defaults
pub fn defaults() -> BusConfig {
    with_defaults(|d| *d)
}

/// Changes the baud rate of buses opened from now on. Already opened buses
/// keep their speed.
///
/// Typical usage to change the speed of a running setup is to write the new
/// speed to the bus speed parameter of all devices, close the bus, call this
/// function and open the bus again.
pub fn set_baudrate(bps: u32) -> BusResult<()> {
    with_defaults(|d| d.set_baudrate(bps))
}

/// Changes the reply timeout of buses opened from now on, see
/// [`BusConfig::set_timeout`]. Since there is no bus involved, the result is
/// only reported to the caller and never accumulated anywhere.
pub fn set_timeout(millis: u16) -> BusResult<()> {
    with_defaults(|d| d.set_timeout(millis))
}
