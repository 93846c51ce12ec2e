//! # PCIe Endpoint Controller
//!
//! Downstream, the controller serves configuration requests from the Type-0 configuration space
//! of the function and forwards memory requests to the device facade. Upstream, it passes device
//! DMA on to the root port.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

use tracing::{error, trace};

use crate::{
    device::{
        bus::{Request, RequestSize},
        facade::DeviceFacade,
        pci::config_space::ConfigSpace,
        region::RegionId,
        transaction::{
            Command, InitiatorSocket, ResponseStatus, TargetRef, Transaction, TransactionTarget,
        },
    },
    error::TopologyError,
    sim::time::SimDuration,
};

/// The address space a downstream request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// The configuration space of the function.
    Config,

    /// The memory window of a BAR.
    Bar(RegionId),
}

/// The downstream side of the link as the root port sees it.
pub trait Endpoint: Debug + Send + Sync {
    /// Complete a request into `space`.
    fn transport(&self, space: Space, trans: &mut Transaction, delay: &mut SimDuration);
}

/// The protocol translation layer of the endpoint.
#[derive(Debug)]
pub struct PcieController {
    config_space: Mutex<ConfigSpace>,
    device: InitiatorSocket<DeviceFacade>,
    upstream: InitiatorSocket<dyn TransactionTarget>,
}

impl PcieController {
    /// Create a controller serving `config_space`.
    #[must_use]
    pub fn new(config_space: ConfigSpace) -> Self {
        Self {
            config_space: Mutex::new(config_space),
            device: InitiatorSocket::new("pcie.device"),
            upstream: InitiatorSocket::new("pcie.upstream"),
        }
    }

    /// Connect the downstream side to the device.
    pub fn bind_device(&self, device: Arc<DeviceFacade>) -> Result<(), TopologyError> {
        self.device.bind(device)
    }

    /// Connect the upstream side to the root port.
    pub fn bind_upstream(&self, target: TargetRef) -> Result<(), TopologyError> {
        self.upstream.bind(target)
    }

    /// Fail if any socket of the controller is not bound.
    pub fn check_bound(&self) -> Result<(), TopologyError> {
        self.device.check_bound()?;
        self.upstream.check_bound()
    }

    /// The size of a BAR as advertised in the configuration space.
    #[must_use]
    pub fn bar_size(&self, bar: RegionId) -> Option<u32> {
        self.config_space
            .lock()
            .unwrap()
            .bar(bar)
            .map(|info| info.size())
    }

    fn config_access(&self, trans: &mut Transaction) {
        let size = match RequestSize::try_from(trans.len()) {
            Ok(size @ (RequestSize::Size1 | RequestSize::Size2 | RequestSize::Size4)) => size,
            _ => {
                trans.set_status(ResponseStatus::BurstError);
                return;
            }
        };

        let mut config_space = self.config_space.lock().unwrap();

        match trans.range() {
            Some(range) if range.end <= config_space.size() as u64 => {}
            _ => {
                trans.set_status(ResponseStatus::AddressError);
                return;
            }
        }

        let req = Request::new(trans.address(), size);
        let len = trans.len();

        match trans.command() {
            Command::Read => {
                let value = config_space.read(req);
                trans
                    .data_mut()
                    .copy_from_slice(&value.to_le_bytes()[..len]);
            }
            Command::Write => {
                let mut bytes = [0; 8];
                bytes[..len].copy_from_slice(trans.data());
                config_space.write(req, u64::from_le_bytes(bytes));
            }
        }

        trace!("config {} {req}", trans.command());
        trans.set_status(ResponseStatus::Ok);
    }
}

impl Endpoint for PcieController {
    fn transport(&self, space: Space, trans: &mut Transaction, delay: &mut SimDuration) {
        match space {
            Space::Config => self.config_access(trans),
            Space::Bar(bar) => match self.device.target() {
                Ok(device) => device.route(bar, trans, delay),
                Err(e) => {
                    error!("Dropping BAR{bar} access: {e}");
                    trans.set_status(ResponseStatus::GenericError);
                }
            },
        }
    }
}

impl TransactionTarget for PcieController {
    fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration) {
        self.upstream.b_transport(trans, delay);
    }
}
