//! # PCI Function Emulation
//!
//! The endpoint is a single PCI Express function. This module contains the generic configuration
//! space emulation in [`config_space`] and the concrete function the harness exposes in
//! [`function`].
//!
//! ## Example
//!
//! ```rust
//! use pcie_cosim::device::{
//!     bus::{Request, RequestSize},
//!     pci::function::endpoint_config_space,
//!     region::{Access, RegionKind, RegionTableBuilder},
//! };
//!
//! let regions = RegionTableBuilder::new()
//!     .region(0, RegionKind::UserBar, 0x1000, Access::ReadWrite)
//!     .build()
//!     .unwrap();
//!
//! let cfg = endpoint_config_space(&regions);
//! assert_eq!(cfg.read(Request::new(0, RequestSize::Size2)), 0x10EE);
//! ```

pub mod config_space;
pub mod constants;
pub mod function;
