//! # pcie-cosim
//!
//! A co-simulation harness for a PCIe endpoint. A bridge model and the user RTL design are
//! composed into a single endpoint, driven by a shared clock and reset fabric and connected to a
//! host simulator over vfio-user. See [`topology::Top`] for the assembled system.

pub mod config;
pub mod device;
pub mod dynamic_bus;
pub mod error;
pub mod host;
pub mod memory_segment;
pub mod pcie;
pub mod sim;
pub mod topology;
