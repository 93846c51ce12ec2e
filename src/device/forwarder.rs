//! # DMA Forwarder
//!
//! The forwarder connects the bridge's DMA-initiator socket to the upstream side of the PCIe
//! controller. It passes every transaction through unchanged: no address remapping, no data
//! transformation.

use tracing::trace;

use crate::{error::TopologyError, sim::time::SimDuration};

use super::transaction::{InitiatorSocket, TargetRef, Transaction, TransactionTarget};

/// Relays device DMA upstream.
#[derive(Debug)]
pub struct DmaForwarder {
    upstream: InitiatorSocket<dyn TransactionTarget>,
}

impl Default for DmaForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaForwarder {
    /// Create a forwarder with an unbound upstream socket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            upstream: InitiatorSocket::new("dma_forwarder.upstream"),
        }
    }

    /// Connect the upstream socket.
    pub fn bind_upstream(&self, target: TargetRef) -> Result<(), TopologyError> {
        self.upstream.bind(target)
    }

    /// Fail if the upstream socket is not bound.
    pub fn check_bound(&self) -> Result<(), TopologyError> {
        self.upstream.check_bound()
    }
}

impl TransactionTarget for DmaForwarder {
    fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration) {
        trace!(
            "DMA {} {:#x}+{:x}",
            trans.command(),
            trans.address(),
            trans.len()
        );

        self.upstream.b_transport(trans, delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::device::transaction::{testutils::RecordingTarget, Command, ResponseStatus};

    #[test]
    fn unbound_forwarder_is_reported() {
        assert!(DmaForwarder::new().check_bound().is_err());
    }

    proptest! {
        #[test]
        fn transactions_pass_through_unchanged(
            address: u64,
            write: bool,
            data in proptest::collection::vec(any::<u8>(), 0..64),
            latency_ns in 0u64..100,
        ) {
            let forwarder = DmaForwarder::new();
            let upstream = Arc::new(
                RecordingTarget::new(0x5a).with_latency(SimDuration::from_ns(latency_ns)),
            );
            forwarder.bind_upstream(upstream.clone()).unwrap();

            let mut trans = if write {
                Transaction::write(address, data.clone())
            } else {
                Transaction::read(address, data.len())
            };
            let sent = trans.clone();
            let mut delay = SimDuration::ZERO;

            forwarder.b_transport(&mut trans, &mut delay);

            // The upstream side saw exactly what the bridge issued.
            let seen = upstream.seen.lock().unwrap().clone();
            prop_assert_eq!(seen, vec![sent]);

            // The upstream response is visible in the same transaction.
            prop_assert_eq!(trans.status(), ResponseStatus::Ok);
            prop_assert_eq!(trans.address(), address);
            prop_assert_eq!(delay, SimDuration::from_ns(latency_ns));

            if trans.command() == Command::Read {
                prop_assert!(trans.data().iter().all(|&b| b == 0x5a));
            } else {
                prop_assert_eq!(trans.data(), &data[..]);
            }
        }
    }
}
