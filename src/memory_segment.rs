//! Provide a [`BusDevice`] abstraction over a piece of a mmap'able
//! file. The host shares its memory with the device this way.

use std::{
    fs::File,
    sync::atomic::{AtomicU8, Ordering},
};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::warn;
use vfio_user::DmaMapFlags;

use crate::device::bus::BusDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRights {
    ReadOnly,
    ReadWrite,
}

#[derive(thiserror::Error, Debug)]
pub enum DmaMapFlagsError {
    #[error("Invalid DMA map flags: {value:?}")]
    InvalidFlags { value: DmaMapFlags },
}

impl TryFrom<DmaMapFlags> for AccessRights {
    type Error = DmaMapFlagsError;

    fn try_from(value: DmaMapFlags) -> Result<Self, Self::Error> {
        let readable = value.contains(DmaMapFlags::READ);
        let writable = value.contains(DmaMapFlags::WRITE);

        if value.bits() & !DmaMapFlags::READ_WRITE.bits() != 0 {
            warn!("Unknown DmaMapFlags set: {:0x}", value.bits());
        }

        match (readable, writable) {
            (true, false) => Ok(Self::ReadOnly),
            (true, true) => Ok(Self::ReadWrite),
            _ => Err(DmaMapFlagsError::InvalidFlags { value }),
        }
    }
}

#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    #[allow(clippy::missing_const_for_fn)] // false positive
    fn as_ptr(&self) -> *const u8 {
        match self {
            Self::ReadOnly(map) => map.as_ptr(),
            Self::ReadWrite(map) => map.as_ptr(),
        }
    }

    const fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite(_))
    }
}

/// A contiguous piece of mmap'ed memory.
#[derive(Debug)]
pub struct MemorySegment {
    size: u64,
    mapping: Mapping,
}

impl MemorySegment {
    /// Creates a memory segment from a file.
    ///
    /// The `File` object is only used for memory-mapping and will not
    /// be read or written to. We only access the underlying file via
    /// the memory mapping.
    pub fn new_from_fd(
        fd: &File,
        file_offset: u64,
        size: u64,
        access_rights: AccessRights,
    ) -> Result<Self, std::io::Error> {
        let len = usize::try_from(size)
            .map_err(|_| std::io::Error::other(format!("Segment size {size:#x} too large")))?;

        let mut mmap = MmapOptions::new();
        mmap.len(len).offset(file_offset);

        let mapping = match access_rights {
            // SAFETY: We only access mmap'ed memory via atomics, so the warnings
            // around UB in the Mmap and MmapMut documentation do not apply.
            AccessRights::ReadOnly => unsafe { Mapping::ReadOnly(mmap.map(fd)?) },

            // SAFETY: See above.
            AccessRights::ReadWrite => unsafe { Mapping::ReadWrite(mmap.map_mut(fd)?) },
        };

        Ok(Self { size, mapping })
    }

    /// The bytes in `offset..offset + len` as atomics.
    ///
    /// The bus only hands out accesses inside the segment, so a violation is
    /// a bug in the caller.
    fn atomics(&self, offset: u64, len: usize) -> &[AtomicU8] {
        let end = offset.checked_add(len as u64);
        assert!(end.is_some_and(|end| end <= self.size));

        // SAFETY: We check whether the access fits into the memory region
        // above. All accesses to the memory happen via atomics, because the
        // pointer never escapes from MemorySegment.
        unsafe {
            let ptr = self.mapping.as_ptr().add(offset as usize);

            std::slice::from_raw_parts(ptr.cast::<AtomicU8>(), len)
        }
    }
}

impl BusDevice for MemorySegment {
    fn size(&self) -> u64 {
        self.size
    }

    fn writable(&self) -> bool {
        self.mapping.is_writable()
    }

    fn read_bulk(&self, offset: u64, data: &mut [u8]) {
        let len = data.len();

        for (dst, src) in data.iter_mut().zip(self.atomics(offset, len)) {
            *dst = src.load(Ordering::Relaxed);
        }
    }

    fn write_bulk(&self, offset: u64, data: &[u8]) {
        if !self.mapping.is_writable() {
            return;
        }

        for (dst, src) in self.atomics(offset, data.len()).iter().zip(data) {
            dst.store(*src, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
pub mod testutils {
    use std::{ffi::CString, fs::File, os::fd::FromRawFd};

    pub fn create_memfd(size: u64) -> Result<File, std::io::Error> {
        let fd = unsafe { libc::memfd_create(CString::new("unittest").unwrap().as_ptr(), 0) };

        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }

        // SAFETY: fd is a valid file descriptor, because we created it above.
        let file = unsafe { File::from_raw_fd(fd) };
        file.set_len(size)?;

        Ok(file)
    }
}
