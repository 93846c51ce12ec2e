//! # Endpoint Device Models
//!
//! This module contains the device side of the harness: the transaction layer, the region decode
//! table, the device facade with its router and DMA forwarder, and the stand-in sub-models. It
//! should never depend on the host-side transport.

#![deny(missing_docs)]
#![deny(rustdoc::all)]
#![deny(clippy::must_use_candidate)]
#![deny(missing_debug_implementations)]

pub mod bridge;
pub mod bus;
pub mod facade;
pub mod forwarder;
pub mod interval;
pub mod pci;
pub mod region;
pub mod register_set;
pub mod rtl;
pub mod scratchpad;
pub mod transaction;
