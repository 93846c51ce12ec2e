//! A memory bus whose mappings change at runtime.
//!
//! The host adds and removes memory regions while device models keep
//! accessing it. Readers work on an immutable snapshot of the bus that
//! is swapped out wholesale on every change.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::device::bus::{AddBusDeviceError, Bus, BusAccessError, BusDeviceRef};

#[derive(Debug)]
struct DeviceEntry {
    start_addr: u64,
    device: BusDeviceRef,
}

/// A memory bus that can be remapped while it is accessed.
///
/// Mapping changes are serialized. Accesses see either the old or the new
/// set of mappings, never a mix of both.
#[derive(Debug)]
pub struct DynamicBus {
    name: &'static str,
    segments: Mutex<Vec<DeviceEntry>>,
    bus: ArcSwap<Bus>,
}

impl Default for DynamicBus {
    fn default() -> Self {
        Self::new("DMA bus")
    }
}

impl DynamicBus {
    /// Create an empty bus. `name` only appears in log messages.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            segments: Mutex::default(),
            bus: ArcSwap::from_pointee(Bus::new(name, u64::MAX)),
        }
    }

    /// Rebuild the snapshot from `segments` and publish it.
    fn publish(&self, segments: &[DeviceEntry]) -> Result<(), AddBusDeviceError> {
        let mut new_bus = Bus::new(self.name, u64::MAX);

        for segment in segments {
            new_bus.add(segment.start_addr, segment.device.clone())?;
        }

        // It's okay to use store here, because we only have a single
        // writer (serialized by the mutex).
        self.bus.store(Arc::new(new_bus));

        Ok(())
    }

    /// Map `device` at `start_addr`.
    ///
    /// Fails, leaving the bus unchanged, if the device overlaps an existing
    /// mapping or does not fit into the address space.
    pub fn add(&self, start_addr: u64, device: BusDeviceRef) -> Result<(), AddBusDeviceError> {
        let mut segments = self.segments.lock().unwrap();
        let size = device.size();

        segments.push(DeviceEntry { start_addr, device });

        if let Err(e) = self.publish(&segments) {
            // Keep the list in sync with the published bus.
            segments.pop();
            return Err(e);
        }

        debug!("{}: mapped {start_addr:#x}+{size:x}", self.name);
        Ok(())
    }

    /// Remove the segment starting at `start_addr`. Returns `false` if
    /// there is none.
    pub fn remove(&self, start_addr: u64) -> bool {
        let mut segments = self.segments.lock().unwrap();

        let Some(pos) = segments.iter().position(|s| s.start_addr == start_addr) else {
            return false;
        };

        segments.swap_remove(pos);

        // Removing a segment cannot introduce overlaps.
        let mut bus = Bus::clone(&self.bus.load());
        bus.remove(start_addr);
        self.bus.store(Arc::new(bus));

        debug!("{}: unmapped {start_addr:#x}", self.name);
        true
    }

    /// Read `data.len()` bytes at `addr`. Fails if any byte is unmapped.
    pub fn read(&self, addr: u64, data: &mut [u8]) -> Result<(), BusAccessError> {
        self.bus.load().read(addr, data)
    }

    /// Write `data` to `addr`. Fails if any byte is unmapped or read-only.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<(), BusAccessError> {
        self.bus.load().write(addr, data)
    }
}
