//! # PCI Configuration Space Helpers
//!
//! This module contains helpers for creating and emulating a PCI Configuration Space. To construct
//! a Configuration Space use [`ConfigSpaceBuilder`].

use crate::device::{
    bus::{Request, RequestSize},
    register_set::{RegisterSet, RegisterSetBuilder},
};

use super::constants::config_space::{
    self, capability_id, command, header_type, mask::CAPABILITIES_POINTER as CAPABILITY_POINTER_MASK,
    offset, pcie, pm, status, MAX_BARS,
};

/// The offset at which we start to allocate capabilities.
const INITIAL_CAPABILITY_OFFSET: u8 = 0x40;

/// The size of the generic capability header (ID and next pointer).
const CAPABILITY_HEADER_SIZE: usize = 2;

/// Meta-information about a PCI BAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarInfo {
    size: u32,
}

impl BarInfo {
    /// The size of the BAR in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }
}

/// A builder for [`ConfigSpace`] objects.
#[derive(Debug, Clone)]
pub struct ConfigSpaceBuilder {
    reg_builder: RegisterSetBuilder<{ config_space::SIZE }>,
    revision: u8,
    bars: [Option<BarInfo>; MAX_BARS],

    /// The offset in the Configuration Space where we add the next capability.
    ///
    /// This has to be a 4-byte aligned address as mandated by the PCI specification.
    next_capability_offset: u8,

    /// The offset where the capability pointer needs to be updated when we add a capability.
    last_capability_pointer: u8,
}

impl ConfigSpaceBuilder {
    /// Create a builder for [`ConfigSpace`] with default settings.
    ///
    /// There are pre-defined constants for [`vendor`](super::constants::config_space::vendor) and
    /// [`device`](super::constants::config_space::device) IDs.
    #[must_use]
    pub fn new(vendor: u16, device: u16) -> Self {
        let mut reg_builder = RegisterSetBuilder::<{ config_space::SIZE }>::new();

        reg_builder
            .u16_le_ro_at(offset::VENDOR, vendor)
            .u16_le_ro_at(offset::DEVICE, device)
            .u16_le_at(offset::COMMAND, 0, command::WRITABLE_BITS)
            .u8_rw_at(offset::CACHE_LINE_SIZE, 0)
            .u8_rw_at(offset::LATENCY_TIMER, 0)
            .u8_ro_at(offset::BIST, 0)
            .u32_le_ro_at(offset::ROM_BAR, 0)
            .u8_ro_at(offset::MIN_GNT, 0)
            .u8_ro_at(offset::MAX_LAT, 0);

        for i in 0..MAX_BARS {
            // Unimplemented BARs are hardwired to zero.
            reg_builder.u32_le_ro_at(offset::BAR_0 + i * 4, 0);
        }

        Self {
            reg_builder,
            revision: 0,
            bars: [None; MAX_BARS],
            next_capability_offset: INITIAL_CAPABILITY_OFFSET,
            last_capability_pointer: offset::CAPABILITIES_POINTER as u8,
        }
    }

    /// Configure the class and subclass field.
    ///
    /// When these are not set, they default to `0xFF`, which is the undefined device class and
    /// subclass.
    #[must_use]
    pub fn class(mut self, class: u8, subclass: u8, prog_if: u8) -> Self {
        self.reg_builder
            .u8_ro_at(offset::CLASS, class)
            .u8_ro_at(offset::SUBCLASS, subclass)
            .u8_ro_at(offset::PROG_IF, prog_if);

        self
    }

    /// Configure the revision field for this device.
    ///
    /// When not specified, the revision defaults to 0.
    #[must_use]
    pub fn revision(mut self, revision: u8) -> Self {
        self.revision = revision;

        self
    }

    /// Configure the subsystem and subsystem vendor IDs.
    #[must_use]
    pub fn subsystem(mut self, subsystem_vendor_id: u16, subsystem_id: u16) -> Self {
        self.reg_builder
            .u16_le_ro_at(offset::SUBSYSTEM_VENDOR_ID, subsystem_vendor_id)
            .u16_le_ro_at(offset::SUBSYSTEM_ID, subsystem_id);

        self
    }

    /// Add a Base Address Register (BAR) for a non-prefetchable 32-bit memory region.
    ///
    /// Size must be a power of 2 and at least 16 bytes.
    #[must_use]
    pub fn mem32_nonprefetchable_bar(mut self, index: u8, size: u32) -> Self {
        let index: usize = index.into();

        assert!(index < MAX_BARS);
        assert_eq!(self.bars[index], None);

        assert!(size.is_power_of_two());
        assert!(size >= 16);

        self.reg_builder
            .u32_le_at(offset::BAR_0 + index * 4, 0, !(size - 1));

        self.bars[index] = Some(BarInfo { size });
        self
    }

    /// Add a PCI capability to the Configuration Space.
    ///
    /// The given `regs` must not contain the generic PCI Capability header (ID and next
    /// pointer). These fields will be added automatically.
    #[must_use]
    pub fn capability<const CAP_SIZE: usize>(
        mut self,
        capability_id: u8,
        regs: &RegisterSet<CAP_SIZE>,
    ) -> Self {
        let offset = self.next_capability_offset;
        assert_eq!(offset & !CAPABILITY_POINTER_MASK, 0);

        // The next capability must start at an aligned address.
        let next_offset =
            (usize::from(offset) + CAPABILITY_HEADER_SIZE + CAP_SIZE).next_multiple_of(4);
        assert!(
            next_offset <= config_space::SIZE,
            "Capability {capability_id:#x} does not fit into the Configuration Space"
        );

        self.reg_builder
            // Extend the capability pointer list to include the new capability.
            .u8_ro_at(self.last_capability_pointer.into(), offset)
            // Add the capability header. The next pointer will be written when we add the next
            // capability or when we finalize the Configuration Space.
            .u8_ro_at(offset.into(), capability_id)
            .register_set_at(usize::from(offset) + CAPABILITY_HEADER_SIZE, regs);

        // A capability that ends exactly at the end of the Configuration Space leaves no room for
        // another one.
        self.next_capability_offset = u8::try_from(next_offset).unwrap_or(0);
        self.last_capability_pointer = offset + 1;
        self
    }

    /// Add a Power Management capability for a device that only supports D0 and D3hot.
    #[must_use]
    pub fn power_management_capability(self) -> Self {
        let pm_cap: RegisterSet<{ pm::BODY_SIZE }> =
            RegisterSetBuilder::<{ pm::BODY_SIZE }>::zeroed()
                .u16_le_ro_at(pm::PMC, pm::PMC_VERSION_1_2)
                .u16_le_mixed_at(
                    pm::PMCSR,
                    0,
                    pm::pmcsr::POWER_STATE,
                    pm::pmcsr::PME_STATUS,
                )
                .into();

        self.capability(capability_id::POWER_MANAGEMENT, &pm_cap)
    }

    /// Add a PCI Express capability describing an endpoint with the given device and link
    /// capabilities and current link status.
    #[must_use]
    pub fn pci_express_capability(self, devcap: u32, lnkcap: u32, lnksta: u16) -> Self {
        let pcie_cap: RegisterSet<{ pcie::BODY_SIZE }> =
            RegisterSetBuilder::<{ pcie::BODY_SIZE }>::zeroed()
                .u16_le_ro_at(pcie::FLAGS, pcie::FLAGS_V2_ENDPOINT)
                .u32_le_ro_at(pcie::DEVCAP, devcap)
                .u16_le_at(pcie::DEVCTL, 0, 0x7FFF)
                .u16_le_w1c_at(pcie::DEVSTA, 0)
                .u32_le_ro_at(pcie::LNKCAP, lnkcap)
                .u16_le_at(pcie::LNKCTL, 0, 0x00C3)
                .u16_le_ro_at(pcie::LNKSTA, lnksta)
                .into();

        self.capability(capability_id::PCI_EXPRESS, &pcie_cap)
    }

    /// Create the finalized Configuration Space object.
    #[must_use]
    pub fn config_space(mut self) -> ConfigSpace {
        let has_capabilities = self.last_capability_pointer != offset::CAPABILITIES_POINTER as u8;

        ConfigSpace {
            bars: self.bars,
            config_space: self
                .reg_builder
                // No legacy interrupt is connected.
                .u8_rw_at(offset::IRQ_LINE, 0xFF)
                .u8_ro_at(offset::IRQ_PIN, 0)
                // The error bits of the status register can never be set, so hardcoding them to
                // zero gives the correct write-one-clear semantics.
                .u16_le_ro_at(
                    offset::STATUS,
                    if has_capabilities {
                        status::CAPABILITIES
                    } else {
                        0
                    },
                )
                .u8_ro_at(offset::REVISION, self.revision)
                .u8_ro_at(offset::HEADER_TYPE, header_type::TYPE_00)
                // Finalize the list of capabilities by ending the pointer chain.
                .u8_ro_at(self.last_capability_pointer.into(), 0)
                .into(),
        }
    }
}

/// The Configuration Space of a PCI device.
///
/// Use [`ConfigSpaceBuilder`] to construct this.
///
/// # Limitations
///
/// Writes have no side effects beyond changing writable bits. BARs can be sized and programmed,
/// but the programmed addresses are not used for decoding: the host addresses BARs by index.
#[derive(Debug, Clone)]
pub struct ConfigSpace {
    config_space: RegisterSet<{ config_space::SIZE }>,
    bars: [Option<BarInfo>; MAX_BARS],
}

/// An iterator that yields offsets of standard PCI capabilities.
struct CapabilityIterator<'a> {
    config_space: &'a ConfigSpace,
    cap_offset: u8,
}

impl Iterator for CapabilityIterator<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cap_offset == 0 {
            return None;
        }

        let cap_ptr =
            self.config_space
                .read(Request::new(self.cap_offset.into(), RequestSize::Size1)) as u8
                & CAPABILITY_POINTER_MASK;

        if cap_ptr == 0 {
            self.cap_offset = 0;
            None
        } else {
            // The pointer points to the ID field. The next offset is one byte after it.
            self.cap_offset = cap_ptr + 1;
            Some(cap_ptr)
        }
    }
}

impl ConfigSpace {
    /// The size of the Configuration Space in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        config_space::SIZE
    }

    /// Read a register.
    #[must_use]
    pub fn read(&self, req: Request) -> u64 {
        self.config_space.read(req)
    }

    /// Write a register.
    pub fn write(&mut self, req: Request, value: u64) {
        self.config_space.write(req, value);
    }

    /// Iterate over all capabilities of the Configuration Space.
    ///
    /// The resulting iterator returns the Configuration Space offset of each standard PCI
    /// capability.
    pub fn iter_capability_offsets(&self) -> impl Iterator<Item = u8> + '_ {
        CapabilityIterator {
            config_space: self,
            cap_offset: offset::CAPABILITIES_POINTER as u8,
        }
    }

    /// Retrieve information about a specific BAR.
    #[must_use]
    pub fn bar(&self, bar_no: u8) -> Option<BarInfo> {
        self.bars.get(usize::from(bar_no)).and_then(|&b| b)
    }
}
