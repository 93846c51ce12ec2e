//! # Device Model Facade
//!
//! The facade presents the bridge model and the user RTL design as one PCIe endpoint. On the
//! inbound side it is the transaction router: host accesses arrive with a region identifier and
//! are forwarded to the bridge socket behind that region. On the outbound side it owns the
//! [`DmaForwarder`] that carries the bridge's DMA upstream.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    error::TopologyError,
    sim::{clock::Clocked, fabric::ClockResetFabric, reset::ResetSink, time::SimDuration},
};

use super::{
    bridge::{BridgeModel, RtlModel},
    forwarder::DmaForwarder,
    region::{RegionDescriptor, RegionId, RegionTable},
    transaction::{InitiatorSocket, ResponseStatus, TargetRef, Transaction, TransactionTarget},
};

/// A region and the socket its accesses are routed to.
#[derive(Debug)]
struct RegionPort {
    descriptor: RegionDescriptor,
    socket: InitiatorSocket<dyn TransactionTarget>,
}

/// The endpoint as seen by the PCIe controller.
#[derive(Debug)]
pub struct DeviceFacade {
    regions: RegionTable,
    ports: Vec<RegionPort>,
    forwarder: Arc<DmaForwarder>,
    bridge: Arc<dyn BridgeModel>,
    clocked: Vec<Arc<dyn Clocked>>,
    reset_sinks: Vec<Arc<dyn ResetSink>>,
}

impl DeviceFacade {
    /// Wire the sub-models together.
    ///
    /// Every region in `regions` is bound to the bridge socket of its kind and the bridge's DMA
    /// socket is bound to the forwarder. Fails if the bridge has no socket for a region.
    pub fn new<B, U>(
        regions: RegionTable,
        bridge: Arc<B>,
        user_logic: Arc<U>,
    ) -> Result<Self, TopologyError>
    where
        B: BridgeModel + 'static,
        U: RtlModel + 'static,
    {
        let ports = regions
            .iter()
            .map(|descriptor| {
                let socket = InitiatorSocket::new(format!("router.region{}", descriptor.id));
                let target = bridge.region_target(descriptor.kind).ok_or(
                    TopologyError::MissingRegionHandler {
                        region: descriptor.id,
                    },
                )?;

                socket.bind(target)?;

                Ok(RegionPort {
                    descriptor: *descriptor,
                    socket,
                })
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        let forwarder = Arc::new(DmaForwarder::new());
        bridge.dma_socket().bind(forwarder.clone())?;

        let bridge_clock: Arc<dyn Clocked> = bridge.clone();
        let bridge_reset: Arc<dyn ResetSink> = bridge.clone();
        let user_clock: Arc<dyn Clocked> = user_logic.clone();
        let user_reset: Arc<dyn ResetSink> = user_logic;

        Ok(Self {
            regions,
            ports,
            forwarder,
            bridge,
            clocked: vec![bridge_clock, user_clock],
            reset_sinks: vec![bridge_reset, user_reset],
        })
    }

    /// The region decode table.
    #[must_use]
    pub const fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Connect the sub-models to the clocks and the reset of `fabric`.
    ///
    /// The bridge is put into its initial state first, so it is defined even before the first
    /// reset edge.
    pub fn attach(&self, fabric: &mut ClockResetFabric) -> Result<(), TopologyError> {
        self.bridge.reset();

        for model in &self.clocked {
            fabric.bind_clocks(model.clone())?;
        }

        for sink in &self.reset_sinks {
            fabric.bind_reset(sink.clone());
        }

        Ok(())
    }

    /// Connect the DMA path to the upstream side of the PCIe controller.
    pub fn bind_upstream(&self, target: TargetRef) -> Result<(), TopologyError> {
        self.forwarder.bind_upstream(target)
    }

    /// Fail if any socket of the facade is not bound.
    pub fn check_bound(&self) -> Result<(), TopologyError> {
        for port in &self.ports {
            port.socket.check_bound()?;
        }

        self.bridge.dma_socket().check_bound()?;
        self.forwarder.check_bound()
    }

    /// Route a host access to the region `region`.
    ///
    /// Accesses to unknown regions fail with [`ResponseStatus::GenericError`] and are not
    /// forwarded. Accesses outside the region or writes to read-only regions are rejected as
    /// well. Everything else reaches the region's socket unchanged, and its response is the
    /// response of the route. `delay` is passed through as is.
    pub fn route(&self, region: RegionId, trans: &mut Transaction, delay: &mut SimDuration) {
        debug!(
            "visit region: region={region}, addr={:#x}, buf={:p}, cmd={}, len={}",
            trans.address(),
            trans.data().as_ptr(),
            trans.command(),
            trans.len()
        );

        let Some(port) = self.ports.iter().find(|p| p.descriptor.id == region) else {
            error!("Access to unimplemented region {region}");
            trans.set_status(ResponseStatus::GenericError);
            return;
        };

        if let Err(status) = port.descriptor.check(trans) {
            warn!(
                "Rejected {} of {:#x}+{:x} in region {region}: {status:?}",
                trans.command(),
                trans.address(),
                trans.len()
            );
            trans.set_status(status);
            return;
        }

        port.socket.b_transport(trans, delay);
    }
}

#[cfg(test)]
pub(crate) mod testutils {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        device::{
            region::RegionKind,
            transaction::testutils::RecordingTarget,
        },
        sim::{clock::ClockInput, time::SimTime},
    };

    /// A bridge whose region sockets record their traffic.
    #[derive(Debug)]
    pub struct FakeBridge {
        pub user: Arc<RecordingTarget>,
        pub config: Arc<RecordingTarget>,
        pub dma: InitiatorSocket<dyn TransactionTarget>,
        pub resets: AtomicU32,
        pub has_config: bool,
    }

    impl FakeBridge {
        pub fn new() -> Self {
            Self {
                user: Arc::new(RecordingTarget::new(0x11)),
                config: Arc::new(RecordingTarget::new(0x22)),
                dma: InitiatorSocket::new("fake.dma"),
                resets: AtomicU32::new(0),
                has_config: true,
            }
        }

        pub fn without_config() -> Self {
            Self {
                has_config: false,
                ..Self::new()
            }
        }
    }

    impl Clocked for FakeBridge {
        fn clock_inputs(&self) -> Vec<ClockInput> {
            vec![ClockInput {
                pin: "clk",
                domain: "slow",
            }]
        }

        fn clock_edge(&self, _pin: &'static str, _rising: bool, _now: SimTime) {}
    }

    impl ResetSink for FakeBridge {
        fn reset_changed(&self, _asserted: bool, _now: SimTime) {}
    }

    impl BridgeModel for FakeBridge {
        fn region_target(&self, kind: RegionKind) -> Option<TargetRef> {
            match kind {
                RegionKind::UserBar => Some(self.user.clone()),
                RegionKind::Config if self.has_config => Some(self.config.clone()),
                RegionKind::Config => None,
            }
        }

        fn dma_socket(&self) -> &InitiatorSocket<dyn TransactionTarget> {
            &self.dma
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// An RTL model without behavior.
    #[derive(Debug, Default)]
    pub struct FakeRtl;

    impl Clocked for FakeRtl {
        fn clock_inputs(&self) -> Vec<ClockInput> {
            vec![ClockInput {
                pin: "CLK",
                domain: "fast",
            }]
        }

        fn clock_edge(&self, _pin: &'static str, _rising: bool, _now: SimTime) {}
    }

    impl ResetSink for FakeRtl {
        fn reset_changed(&self, _asserted: bool, _now: SimTime) {}
    }

    impl RtlModel for FakeRtl {}
}
