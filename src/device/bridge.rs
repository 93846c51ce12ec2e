//! # Sub-Model Interfaces
//!
//! The endpoint consists of two externally supplied models: the PCIe bridge, which terminates the
//! BAR windows and issues DMA, and the user RTL design. They only interact with the rest of the
//! harness through the interfaces in this module.

use crate::sim::{clock::Clocked, reset::ResetSink};

use super::{
    region::RegionKind,
    transaction::{InitiatorSocket, TargetRef, TransactionTarget},
};

/// The PCIe bridge model.
pub trait BridgeModel: Clocked + ResetSink {
    /// The target socket serving regions of the given kind, if the bridge has one.
    fn region_target(&self, kind: RegionKind) -> Option<TargetRef>;

    /// The socket the bridge issues DMA transactions on.
    fn dma_socket(&self) -> &InitiatorSocket<dyn TransactionTarget>;

    /// Put the model into its initial state.
    fn reset(&self);
}

/// The user RTL design. It is driven by clocks and reset only.
pub trait RtlModel: Clocked + ResetSink {}
