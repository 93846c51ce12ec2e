//! # Memory Bus
//!
//! This module implements the bus that host memory regions are mapped into. Devices claim
//! non-overlapping address ranges and the bus splits accesses along device boundaries. Unlike a
//! register bus, a memory bus has no fallback device: an access that touches an address no device
//! claims fails as a whole before any byte is transferred. See [`Bus`] for a starting point.
//!
//! [`Request`] and [`RequestSize`] describe register-sized accesses, as used by the configuration
//! space.

use std::fmt::{Debug, Display, Formatter};
use std::{
    convert::{TryFrom, TryInto},
    fmt,
    ops::Range,
    sync::Arc,
    vec::Vec,
};

use thiserror::Error;
use tracing::trace;

use crate::device::interval::{span, Interval};

/// The size of register requests.
///
/// We don't use plain integers here to prevent use with illegal
/// sizes. [`RequestSize`] can be converted from and to [`u64`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RequestSize {
    Size1 = 1,
    Size2 = 2,
    Size4 = 4,
    Size8 = 8,
}

impl From<RequestSize> for u8 {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl From<RequestSize> for u64 {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl From<RequestSize> for usize {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl Display for RequestSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = u8::from(*self);
        write!(f, "{val}")
    }
}

/// An attempt was made to convert a size into a [`RequestSize`] that
/// cannot be represented.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IllegalRequestSize {}

impl TryFrom<usize> for RequestSize {
    type Error = IllegalRequestSize;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map_err(|_| IllegalRequestSize {})?
            .try_into()
    }
}

impl TryFrom<u64> for RequestSize {
    type Error = IllegalRequestSize;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Size1),
            2 => Ok(Self::Size2),
            4 => Ok(Self::Size4),
            8 => Ok(Self::Size8),
            _ => Err(IllegalRequestSize {}),
        }
    }
}

/// The address-size pair of a register access.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Request {
    /// The byte address of the request.
    pub addr: u64,

    /// The size of this request.
    pub size: RequestSize,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size: u64 = self.size.into();

        write!(f, "{:#016x}+{:x}", self.addr, size)
    }
}

impl Request {
    /// Create a new request from address and size.
    #[must_use]
    pub const fn new(addr: u64, size: RequestSize) -> Self {
        Self { addr, size }
    }

    /// Split a request into individual byte requests.
    pub fn iter_bytes(&self) -> impl Iterator<Item = Self> {
        (self.addr..self.addr + u64::from(self.size))
            .map(|addr| Self::new(addr, RequestSize::Size1))
    }
}

/// A device in a memory bus.
///
/// Accesses are bulk copies. They are not atomic and can interleave with
/// concurrent accesses to the same memory.
pub trait BusDevice: Debug {
    /// Return the size of this device. The device has to respond to
    /// accesses between `0` and `size - 1`.
    ///
    /// A Bus with a `device` attached at `offset` will forward all
    /// accesses in the range `offset..(offset + device.size())` to `device`.
    fn size(&self) -> u64;

    /// Returns `false` if the device ignores writes.
    fn writable(&self) -> bool {
        true
    }

    /// Copy memory starting at `offset` into `data`.
    fn read_bulk(&self, offset: u64, data: &mut [u8]);

    /// Copy `data` into memory starting at `offset`.
    fn write_bulk(&self, offset: u64, data: &[u8]);
}

/// A reference-counting and thread-safe pointer to a generic bus
/// device.
pub type BusDeviceRef = Arc<dyn BusDevice + Send + Sync>;

#[derive(Clone, Debug)]
struct DeviceEntry {
    range: Range<u64>,
    device: BusDeviceRef,
}

/// An error that is thrown when a device could not be added to a bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddBusDeviceError {
    /// The new device overlaps an existing one.
    #[error(
        "New device for {:x}-{:x} overlaps existing device at {:x}-{:x}",
        added_range.start, added_range.end, existing_range.start, existing_range.end
    )]
    OverlapsExistingDevice {
        /// The range that already existed on the bus.
        existing_range: Range<u64>,

        /// The range that was attempted to be added.
        added_range: Range<u64>,
    },

    /// The new device overflows the bounds of the bus.
    #[error("New device at {start:x} with size {size:x} overflows size of bus {bus_size:x}")]
    DeviceOutOfRange {
        /// The size of the bus that was too small to add a new device to.
        bus_size: u64,

        /// The requested start address.
        start: u64,

        /// The size of the device.
        size: u64,
    },
}

/// An access that the bus cannot complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccessError {
    /// No device claims this address.
    #[error("No memory mapped at {addr:#x}")]
    Unmapped {
        /// The first address of the access that is not claimed.
        addr: u64,
    },

    /// A write touches memory that ignores writes.
    #[error("Memory at {addr:#x} is read-only")]
    ReadOnly {
        /// The first address of the read-only memory.
        addr: u64,
    },
}

/// One piece of a bus access that a single device handles.
#[derive(Debug, Clone)]
struct AccessChunk<'a> {
    /// The device to perform the access on.
    device: &'a dyn BusDevice,

    /// The first address of the chunk on the bus.
    bus_addr: u64,

    /// The offset of the chunk relative to the address range that the device claims.
    device_offset: u64,

    /// The range in the original data slice.
    data_range: Range<usize>,
}

/// A memory bus.
///
/// The bus is immutable after an initial construction phase. See
/// [`DynamicBus`](crate::dynamic_bus::DynamicBus) for changing mappings at runtime.
#[derive(Clone, Debug)]
pub struct Bus {
    name: &'static str,
    size: u64,

    /// A vector of device together with the range they claim. When we
    /// add devices, we make sure there is no overlap.
    devices: Vec<DeviceEntry>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new("<unnamed>", u64::MAX)
    }
}

impl Bus {
    /// Construct an empty bus spanning `size` bytes.
    #[must_use]
    pub const fn new(name: &'static str, size: u64) -> Self {
        Self {
            name,
            size,
            devices: Vec::new(),
        }
    }

    /// The size of the address space of the bus.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Add a new item to the bus that claims the given range of
    /// addresses.
    pub fn add(&mut self, start_addr: u64, device: BusDeviceRef) -> Result<(), AddBusDeviceError> {
        let out_of_range = AddBusDeviceError::DeviceOutOfRange {
            bus_size: self.size,
            start: start_addr,
            size: device.size(),
        };

        let range = span(start_addr, device.size()).ok_or_else(|| out_of_range.clone())?;

        if range.end > self.size {
            Err(out_of_range)
        } else if let Some(overlap) = self.devices.iter().find(|e| e.range.overlaps(&range)) {
            Err(AddBusDeviceError::OverlapsExistingDevice {
                existing_range: overlap.range.clone(),
                added_range: range,
            })
        } else {
            self.devices.push(DeviceEntry { range, device });
            Ok(())
        }
    }

    /// Remove the device that starts at `start_addr`.
    pub fn remove(&mut self, start_addr: u64) -> Option<BusDeviceRef> {
        let pos = self
            .devices
            .iter()
            .position(|e| e.range.start == start_addr)?;

        Some(self.devices.swap_remove(pos).device)
    }

    /// Split an access into per-device chunks.
    ///
    /// Fails if any byte of the access is not claimed by a device, so callers can reject the
    /// access before touching memory.
    fn plan(&self, addr: u64, len: usize) -> Result<Vec<AccessChunk<'_>>, BusAccessError> {
        let end = u64::try_from(len)
            .ok()
            .and_then(|len| addr.checked_add(len))
            .ok_or(BusAccessError::Unmapped { addr: u64::MAX })?;

        let mut chunks = Vec::new();
        let mut cur = addr;

        while cur < end {
            let entry = self
                .devices
                .iter()
                .find(|e| e.range.contains(&cur))
                .ok_or(BusAccessError::Unmapped { addr: cur })?;

            let chunk_end = end.min(entry.range.end);

            // Both offsets are below `len`, so they fit into usize.
            chunks.push(AccessChunk {
                device: entry.device.as_ref(),
                bus_addr: cur,
                device_offset: cur - entry.range.start,
                data_range: (cur - addr) as usize..(chunk_end - addr) as usize,
            });

            cur = chunk_end;
        }

        Ok(chunks)
    }

    /// Read `data.len()` bytes starting at `addr`.
    pub fn read(&self, addr: u64, data: &mut [u8]) -> Result<(), BusAccessError> {
        let chunks = self.plan(addr, data.len())?;

        trace!("{} read: {addr:#x}+{:x}", self.name, data.len());

        for chunk in chunks {
            chunk
                .device
                .read_bulk(chunk.device_offset, &mut data[chunk.data_range]);
        }

        Ok(())
    }

    /// Write `data` starting at `addr`.
    ///
    /// Nothing is written unless every byte of the access is mapped writable.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<(), BusAccessError> {
        let chunks = self.plan(addr, data.len())?;

        if let Some(ro) = chunks.iter().find(|c| !c.device.writable()) {
            return Err(BusAccessError::ReadOnly { addr: ro.bus_addr });
        }

        trace!("{} write: {addr:#x}+{:x}", self.name, data.len());

        for chunk in chunks {
            chunk
                .device
                .write_bulk(chunk.device_offset, &data[chunk.data_range]);
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use super::*;
    use std::sync::Mutex;

    /// A plain RAM device for bus tests.
    #[derive(Debug, Default)]
    pub struct TestBusDevice {
        pub data: Mutex<Vec<u8>>,
        pub read_only: bool,
    }

    impl TestBusDevice {
        pub fn new(data: &[u8]) -> Self {
            Self {
                data: Mutex::new(data.to_vec()),
                read_only: false,
            }
        }

        pub fn read_only(data: &[u8]) -> Self {
            Self {
                read_only: true,
                ..Self::new(data)
            }
        }

        pub fn contents(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }
    }

    impl BusDevice for TestBusDevice {
        fn size(&self) -> u64 {
            self.data.lock().unwrap().len().try_into().unwrap()
        }

        fn writable(&self) -> bool {
            !self.read_only
        }

        fn read_bulk(&self, offset: u64, data: &mut [u8]) {
            let offset: usize = offset.try_into().unwrap();
            data.copy_from_slice(&self.data.lock().unwrap()[offset..(offset + data.len())])
        }

        fn write_bulk(&self, offset: u64, data: &[u8]) {
            let offset: usize = offset.try_into().unwrap();
            self.data.lock().unwrap()[offset..(offset + data.len())].copy_from_slice(data)
        }
    }
}
