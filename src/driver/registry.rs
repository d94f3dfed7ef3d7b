//! Fixed size table of open buses addressed by handles
//!
//! Owning a [`Bus`] directly is enough for most programs. The registry is for
//! code that wants to pass small copyable handles around instead, e.g. across
//! an FFI boundary. A handle stays valid until its bus is closed, afterwards
//! the slot is reused by the next open.


use super::{
    config::{self, BusConfig},
    debug::{smdebug, Verbosity},
    Bus, BusError, BusResult,
};
use std::fmt::Display;

/// Maximum number of buses a [`Registry::new`] can hold at once
pub const DEFAULT_MAX_BUSES: usize = 5;

/// Identifies an open bus inside a [`Registry`]
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct BusHandle(usize);

impl BusHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for BusHandle {
    fn from(i: usize) -> Self {
        BusHandle(i)
    }
}

impl Display for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Table of open buses
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Option<Bus>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Builds a registry holding up to [`DEFAULT_MAX_BUSES`] buses
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BUSES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Registry {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of open buses
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens `name` with the process wide defaults and stores the bus
    ///
    /// # Errors
    /// [`BusError::NoFreeSlot`] if the registry is full, in that case the port
    /// isn't touched. Otherwise everything [`Bus::open`] returns.
    pub fn open(&mut self, name: &str) -> BusResult<BusHandle> {
        self.open_with(name, &config::defaults())
    }

    /// Opens `name` with `config` and stores the bus
    pub fn open_with(&mut self, name: &str, config: &BusConfig) -> BusResult<BusHandle> {
        let slot = self.free_slot()?;
        let bus = Bus::open_with(name, config)?;
        Ok(self.store(slot, bus))
    }

    /// Stores a bus that was opened elsewhere
    ///
    /// # Errors
    /// [`BusError::NoFreeSlot`] if the registry is full, the bus is dropped in
    /// that case
    pub fn attach(&mut self, bus: Bus) -> BusResult<BusHandle> {
        let slot = self.free_slot()?;
        Ok(self.store(slot, bus))
    }

    // lowest free slot, so handles are reused
    fn free_slot(&self) -> BusResult<usize> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or(BusError::NoFreeSlot(self.slots.len()))
    }

    fn store(&mut self, slot: usize, bus: Bus) -> BusHandle {
        let handle = BusHandle(slot);
        smdebug!(Verbosity::Mid, bus = bus.name(), %handle, "bus registered");
        self.slots[slot] = Some(bus);
        handle
    }

    /// Removes the bus from the registry and closes it. The handle is invalid
    /// afterwards.
    ///
    /// # Errors
    /// [`BusError::InvalidHandle`] if the handle doesn't belong to an open bus,
    /// otherwise whatever [`Bus::close`] returns
    pub fn close(&mut self, handle: BusHandle) -> BusResult<()> {
        self.take(handle)?.close()
    }

    /// Removes the bus from the registry without closing it
    pub fn take(&mut self, handle: BusHandle) -> BusResult<Bus> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(BusError::InvalidHandle(handle))
    }

    pub fn get(&self, handle: BusHandle) -> BusResult<&Bus> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(BusError::InvalidHandle(handle))
    }

    pub fn get_mut(&mut self, handle: BusHandle) -> BusResult<&mut Bus> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(BusError::InvalidHandle(handle))
    }

    /// Handles of all open buses, in ascending order
    pub fn handles(&self) -> impl Iterator<Item = BusHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| BusHandle(i))
    }
}
