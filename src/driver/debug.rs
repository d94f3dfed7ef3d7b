//! Verbosity gate for the diagnostics the bus emits through [`tracing`]
//!
//! By default nothing is emitted. Where the messages end up is up to the
//! `tracing` subscriber the application installs.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::sync::atomic::{AtomicU8, Ordering};

/// How chatty the bus is
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Default, FromPrimitive)]
pub enum Verbosity {
    #[default]
    Off,
    Low,
    Mid,
    High,
    Trace,
}

// process wide, like the rest of the defaults in config
static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Off as u8);

/// Sets the verbosity of the diagnostics. Messages of a higher verbosity than
/// `level` are dropped before they reach `tracing`.
pub fn set_debug_output(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Returns the currently configured verbosity
pub fn debug_output() -> Verbosity {
    Verbosity::from_u8(VERBOSITY.load(Ordering::Relaxed)).unwrap_or_default()
}

pub(crate) fn enabled(level: Verbosity) -> bool {
    level != Verbosity::Off && level <= debug_output()
}

// emits a tracing event if the verbosity is enabled
// Low goes out as info, Mid and High as debug and Trace as trace
macro_rules! smdebug {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::driver::debug::enabled(level) {
            match level {
                $crate::driver::debug::Verbosity::Off => {}
                $crate::driver::debug::Verbosity::Low => tracing::info!($($arg)+),
                $crate::driver::debug::Verbosity::Mid
                | $crate::driver::debug::Verbosity::High => tracing::debug!($($arg)+),
                $crate::driver::debug::Verbosity::Trace => tracing::trace!($($arg)+),
            }
        }
    }};
}

pub(crate) use smdebug;
