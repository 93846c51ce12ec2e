//! # Endpoint Function
//!
//! The configuration space of the single physical function the endpoint exposes. It identifies
//! as a Xilinx XDMA network controller and has one memory BAR per decoded region.

use crate::device::region::RegionTable;

use super::{
    config_space::{ConfigSpace, ConfigSpaceBuilder},
    constants::config_space::{
        class, device,
        pcie::{devcap, lnkcap, lnksta},
        subclass, vendor,
    },
};

/// Build the configuration space for an endpoint with the given regions.
///
/// Each region becomes a 32-bit non-prefetchable memory BAR of the region's size at the BAR index
/// equal to the region identifier. The table guarantees that this is always possible.
#[must_use]
pub fn endpoint_config_space(regions: &RegionTable) -> ConfigSpace {
    let builder = ConfigSpaceBuilder::new(vendor::XILINX, device::XILINX_XDMA)
        .class(class::NETWORK, subclass::NETWORK_ETHERNET, 0)
        .subsystem(vendor::XILINX, device::XILINX_XDMA_SUBSYSTEM)
        .power_management_capability()
        .pci_express_capability(
            devcap::RBER,
            lnkcap::SLS_2_5GB | lnkcap::MLW_X1 | lnkcap::ASPM_L0S,
            lnksta::CLS_2_5GB | lnksta::NLW_X1,
        );

    regions
        .iter()
        .fold(builder, |builder, region| {
            builder.mem32_nonprefetchable_bar(region.id, region.size)
        })
        .config_space()
}
