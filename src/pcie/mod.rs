//! # PCIe Protocol Translation
//!
//! The PCIe controller sits between the root port and the endpoint. It terminates configuration
//! requests itself and turns memory requests into accesses to the endpoint's regions.

pub mod controller;
