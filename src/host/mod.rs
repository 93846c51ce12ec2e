//! # Host Side
//!
//! Everything between the harness and the host simulator: the root port that issues host
//! requests and completes device DMA, the vfio-user transport it is backed by, and the pacer
//! that keeps simulated time moving while the host is idle.

pub mod link;
pub mod pacer;
pub mod root_port;
