//! # Host Bridge
//!
//! The root-port end of the link. Downstream it issues host requests into the endpoint.
//! Upstream it completes device DMA against the memory the host shares with the harness.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{error, info, trace, warn};

use crate::{
    device::{
        bus::BusAccessError,
        transaction::{
            Command, InitiatorSocket, ResponseStatus, TargetRef, Transaction, TransactionTarget,
        },
    },
    dynamic_bus::DynamicBus,
    error::TopologyError,
    pcie::controller::{Endpoint, Space},
    sim::{
        reset::ResetSink,
        time::{SimDuration, SimTime},
    },
};

/// Device DMA into host memory.
#[derive(Debug)]
struct HostMemoryTarget {
    memory: DynamicBus,
}

impl TransactionTarget for HostMemoryTarget {
    fn b_transport(&self, trans: &mut Transaction, _delay: &mut SimDuration) {
        let addr = trans.address();
        let result = match trans.command() {
            Command::Read => self.memory.read(addr, trans.data_mut()),
            Command::Write => self.memory.write(addr, trans.data()),
        };

        let status = match result {
            Ok(()) => {
                trace!("DMA {} {addr:#x}+{:x}", trans.command(), trans.len());
                ResponseStatus::Ok
            }
            Err(e @ BusAccessError::Unmapped { .. }) => {
                warn!(
                    "DMA {} {addr:#x}+{:x} failed: {e}",
                    trans.command(),
                    trans.len()
                );
                ResponseStatus::AddressError
            }
            Err(e @ BusAccessError::ReadOnly { .. }) => {
                warn!(
                    "DMA {} {addr:#x}+{:x} failed: {e}",
                    trans.command(),
                    trans.len()
                );
                ResponseStatus::CommandError
            }
        };

        trans.set_status(status);
    }
}

/// The host side of the simulated PCIe link.
#[derive(Debug)]
pub struct HostBridge {
    downstream: InitiatorSocket<dyn Endpoint>,
    memory: Arc<HostMemoryTarget>,
    link_up: AtomicBool,
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge {
    /// Create a bridge without host memory. The link comes up when reset is released.
    #[must_use]
    pub fn new() -> Self {
        Self {
            downstream: InitiatorSocket::new("host.downstream"),
            memory: Arc::new(HostMemoryTarget {
                memory: DynamicBus::new("host memory"),
            }),
            link_up: AtomicBool::new(false),
        }
    }

    /// Connect the downstream side to the endpoint.
    pub fn bind(&self, endpoint: Arc<dyn Endpoint>) -> Result<(), TopologyError> {
        self.downstream.bind(endpoint)
    }

    /// Fail if the downstream socket is not bound.
    pub fn check_bound(&self) -> Result<(), TopologyError> {
        self.downstream.check_bound()
    }

    /// The host memory device DMA is served from.
    #[must_use]
    pub fn memory(&self) -> &DynamicBus {
        &self.memory.memory
    }

    /// The target that completes device DMA.
    #[must_use]
    pub fn dma_target(&self) -> TargetRef {
        self.memory.clone()
    }

    /// Returns `true` once reset was released.
    #[must_use]
    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    /// Issue a host request into the endpoint.
    ///
    /// Requests fail with [`ResponseStatus::GenericError`] until the link is up.
    pub fn issue(&self, space: Space, trans: &mut Transaction, delay: &mut SimDuration) {
        if !self.is_link_up() {
            warn!(
                "Host {} to {space:?} at {:#x} while the link is down",
                trans.command(),
                trans.address()
            );
            trans.set_status(ResponseStatus::GenericError);
            return;
        }

        match self.downstream.target() {
            Ok(endpoint) => endpoint.transport(space, trans, delay),
            Err(e) => {
                error!("Dropping host request: {e}");
                trans.set_status(ResponseStatus::GenericError);
            }
        }
    }
}

impl ResetSink for HostBridge {
    fn reset_changed(&self, asserted: bool, now: SimTime) {
        self.link_up.store(!asserted, Ordering::Release);
        info!("Link {} at {now}", if asserted { "down" } else { "up" });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::device::bus::testutils::TestBusDevice;

    #[derive(Debug, Default)]
    struct EchoEndpoint {
        seen: Mutex<Vec<Space>>,
    }

    impl Endpoint for EchoEndpoint {
        fn transport(&self, space: Space, trans: &mut Transaction, delay: &mut SimDuration) {
            self.seen.lock().unwrap().push(space);
            *delay += SimDuration::from_ns(5);
            trans.set_status(ResponseStatus::Ok);
        }
    }

    fn bridge() -> (HostBridge, Arc<EchoEndpoint>) {
        let bridge = HostBridge::new();
        let endpoint = Arc::new(EchoEndpoint::default());

        bridge.bind(endpoint.clone()).unwrap();
        (bridge, endpoint)
    }

    #[test]
    fn requests_fail_until_reset_is_released() {
        let (bridge, endpoint) = bridge();
        let mut delay = SimDuration::ZERO;

        let mut early = Transaction::read(0, 4);
        bridge.issue(Space::Config, &mut early, &mut delay);
        assert_eq!(early.status(), ResponseStatus::GenericError);

        bridge.reset_changed(true, SimTime::ZERO);
        let mut in_reset = Transaction::read(0, 4);
        bridge.issue(Space::Bar(0), &mut in_reset, &mut delay);
        assert_eq!(in_reset.status(), ResponseStatus::GenericError);

        bridge.reset_changed(false, SimTime::from_ps(1_000_000));
        let mut late = Transaction::read(0, 4);
        bridge.issue(Space::Bar(0), &mut late, &mut delay);

        assert!(late.is_ok());
        assert_eq!(delay, SimDuration::from_ns(5));
        assert_eq!(*endpoint.seen.lock().unwrap(), vec![Space::Bar(0)]);
    }

    #[test]
    fn dma_reaches_mapped_host_memory() {
        let (bridge, _) = bridge();
        let ram = Arc::new(TestBusDevice::new(&[0; 0x100]));
        bridge.memory().add(0x1000, ram.clone()).unwrap();

        let mut write = Transaction::write(0x1010, [1, 2, 3, 4]);
        bridge
            .dma_target()
            .b_transport(&mut write, &mut SimDuration::ZERO);

        assert!(write.is_ok());
        assert_eq!(&ram.contents()[0x10..0x14], &[1, 2, 3, 4]);

        let mut read = Transaction::read(0x1012, 2);
        bridge
            .dma_target()
            .b_transport(&mut read, &mut SimDuration::ZERO);

        assert!(read.is_ok());
        assert_eq!(read.data(), &[3, 4]);
    }

    #[test]
    fn dma_to_unmapped_memory_is_an_address_error() {
        let (bridge, _) = bridge();
        bridge
            .memory()
            .add(0x1000, Arc::new(TestBusDevice::new(&[0; 0x10])))
            .unwrap();

        let mut straddling = Transaction::write(0x100c, [0; 8]);
        bridge
            .dma_target()
            .b_transport(&mut straddling, &mut SimDuration::ZERO);

        assert_eq!(straddling.status(), ResponseStatus::AddressError);
    }

    #[test]
    fn dma_writes_to_read_only_memory_are_command_errors() {
        let (bridge, _) = bridge();
        bridge
            .memory()
            .add(0, Arc::new(TestBusDevice::read_only(&[7; 0x10])))
            .unwrap();

        let mut write = Transaction::write(0, [0; 4]);
        bridge
            .dma_target()
            .b_transport(&mut write, &mut SimDuration::ZERO);

        assert_eq!(write.status(), ResponseStatus::CommandError);
    }
}
