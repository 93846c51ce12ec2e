//! # Region Decode Table
//!
//! The endpoint exposes a fixed set of regions. Each region is a BAR window in front of one
//! socket of the bridge model. The [`RegionTable`] is built and validated once and is immutable
//! afterwards.

use crate::{
    device::{
        interval::{span, Interval},
        pci::constants::config_space::MAX_BARS,
        transaction::{Command, ResponseStatus, Transaction},
    },
    error::TopologyError,
};

/// The identifier of a region. This is the BAR index the host uses.
pub type RegionId = u8;

/// The bridge socket a region is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// The user logic BAR.
    UserBar,

    /// The bridge's own configuration and DMA control BAR.
    Config,
}

/// What the host may do in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Writes fail with [`ResponseStatus::CommandError`].
    ReadOnly,

    /// Reads and writes are allowed.
    ReadWrite,
}

/// The static description of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// The region identifier.
    pub id: RegionId,

    /// The bridge socket serving this region.
    pub kind: RegionKind,

    /// The size of the region in bytes.
    pub size: u32,

    /// The allowed accesses.
    pub access: Access,
}

impl RegionDescriptor {
    /// Check whether `trans` is a legal access to this region.
    ///
    /// Accesses must lie completely inside the region. Out-of-range accesses are rejected, never
    /// clamped.
    pub fn check(&self, trans: &Transaction) -> Result<(), ResponseStatus> {
        let window = 0..u64::from(self.size);
        let len = u64::try_from(trans.len()).map_err(|_| ResponseStatus::AddressError)?;

        match span(trans.address(), len) {
            Some(access) if window.contains_interval(&access) => {}
            _ => return Err(ResponseStatus::AddressError),
        }

        if trans.command() == Command::Write && self.access == Access::ReadOnly {
            return Err(ResponseStatus::CommandError);
        }

        Ok(())
    }
}

/// A builder for [`RegionTable`] objects.
#[derive(Debug, Clone, Default)]
pub struct RegionTableBuilder {
    regions: Vec<RegionDescriptor>,
}

impl RegionTableBuilder {
    /// Create a builder for an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region.
    #[must_use]
    pub fn region(mut self, id: RegionId, kind: RegionKind, size: u32, access: Access) -> Self {
        self.regions.push(RegionDescriptor {
            id,
            kind,
            size,
            access,
        });

        self
    }

    /// Validate the regions and build the table.
    ///
    /// Every region must be representable as a 32-bit memory BAR: its identifier is a BAR index
    /// and its size is a power of two of at least 16 bytes.
    pub fn build(mut self) -> Result<RegionTable, TopologyError> {
        self.regions.sort_by_key(|r| r.id);

        for (i, region) in self.regions.iter().enumerate() {
            if i > 0 && self.regions[i - 1].id == region.id {
                return Err(TopologyError::DuplicateRegion { region: region.id });
            }

            let invalid = |reason| TopologyError::InvalidRegion {
                region: region.id,
                reason,
            };

            if usize::from(region.id) >= MAX_BARS {
                return Err(invalid("identifier is not a BAR index"));
            }

            if !region.size.is_power_of_two() || region.size < 16 {
                return Err(invalid("size is not a power of two of at least 16 bytes"));
            }
        }

        Ok(RegionTable {
            regions: self.regions,
        })
    }
}

/// The validated, immutable region decode table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTable {
    regions: Vec<RegionDescriptor>,
}

impl RegionTable {
    /// Look up a region by identifier.
    #[must_use]
    pub fn lookup(&self, id: RegionId) -> Option<&RegionDescriptor> {
        self.regions
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|pos| &self.regions[pos])
    }

    /// Iterate over all regions in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionDescriptor> {
        self.regions.iter()
    }

    /// The number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if the table has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
