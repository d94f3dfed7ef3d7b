//! OR-able status bits, as returned by every operation and accumulated per bus

use bitflags::bitflags;
use std::fmt::Display;

bitflags! {
    /// Status bits of an operation, or the accumulated bits of a [`Bus`][super::Bus]
    ///
    /// The numeric layout is stable and matches what other SimpleMotion hosts
    /// report, so the raw value can be handed across an FFI boundary as is.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// The operation succeeded
        const OK = 1;
        /// The target was unreachable, e.g. the named port doesn't exist
        const NO_DEVICE = 2;
        /// Link level failure, e.g. the port couldn't be claimed or written
        const BUS = 4;
        /// Timeout, checksum failure or a malformed reply
        const COMMUNICATION = 8;
        /// Invalid id, value, handle or index
        const PARAMETER = 16;
        /// Frame or reply size mismatch
        const LENGTH = 32;
    }
}

impl Status {
    /// No bits set, what a freshly opened or reset bus reports
    pub const NONE: Status = Status::empty();

    /// All bits that signal a fault
    pub const FAULTS: Status = Status::NO_DEVICE
        .union(Status::BUS)
        .union(Status::COMMUNICATION)
        .union(Status::PARAMETER)
        .union(Status::LENGTH);

    /// Returns `true` if any fault bit is set
    pub fn is_fault(&self) -> bool {
        self.intersects(Self::FAULTS)
    }

    /// Returns `true` if only [`Status::OK`] is set
    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        bitflags::parser::to_writer(self, f)
    }
}
