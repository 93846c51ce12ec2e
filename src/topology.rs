//! # Topology Assembly
//!
//! [`Top`] owns the whole simulated system. It wires the components together once, in dependency
//! order, validates the result and only then hands the clock and reset processes to the kernel.
//! Afterwards it is the vfio-user backend: every host access is a blocking transaction into the
//! endpoint whose consumed time is tracked by the quantum keeper.

use std::{fs::File, io, sync::Arc};

use tracing::{debug, info, warn};
use vfio_bindings::bindings::vfio::{
    VFIO_PCI_BAR0_REGION_INDEX, VFIO_PCI_BAR5_REGION_INDEX, VFIO_PCI_CONFIG_REGION_INDEX,
};
use vfio_user::{DmaMapFlags, DmaUnmapFlags, ServerBackend};

use crate::{
    config::HarnessConfig,
    device::{
        bridge::{BridgeModel, RtlModel},
        facade::DeviceFacade,
        pci::function::endpoint_config_space,
        region::{RegionId, RegionTable},
        transaction::Transaction,
    },
    error::TopologyError,
    host::root_port::HostBridge,
    memory_segment::{AccessRights, MemorySegment},
    pcie::controller::{PcieController, Space},
    sim::{
        fabric::ClockResetFabric,
        kernel::Kernel,
        quantum::QuantumKeeper,
        reset::{ResetPhase, ResetSignal},
        time::{SimDuration, SimTime},
    },
};

/// The assembled system.
#[derive(Debug)]
pub struct Top {
    kernel: Kernel,
    keeper: QuantumKeeper,
    host_accesses: u64,
    reset: Arc<ResetSignal>,
    reset_duration: SimDuration,
    regions: RegionTable,
    host: Arc<HostBridge>,
    controller: Arc<PcieController>,
    device: Arc<DeviceFacade>,
}

impl Top {
    /// Assemble the system around the given sub-models.
    ///
    /// Any structural fault is reported before simulated time starts.
    pub fn new<B, U>(
        config: &HarnessConfig,
        bridge: Arc<B>,
        user_logic: Arc<U>,
    ) -> Result<Self, TopologyError>
    where
        B: BridgeModel + 'static,
        U: RtlModel + 'static,
    {
        let keeper = QuantumKeeper::new(config.quantum)?;

        // Clocks and reset
        let mut fabric = ClockResetFabric::new(config.reset_duration);
        for domain in &config.clocks {
            fabric.add_domain(domain.clone())?;
        }

        // Protocol layer and device
        let controller = Arc::new(PcieController::new(endpoint_config_space(
            &config.regions,
        )));
        let device = Arc::new(DeviceFacade::new(
            config.regions.clone(),
            bridge,
            user_logic,
        )?);

        device.attach(&mut fabric)?;
        controller.bind_device(device.clone())?;
        device.bind_upstream(controller.clone())?;

        // Host side
        let host = Arc::new(HostBridge::new());
        host.bind(controller.clone())?;
        controller.bind_upstream(host.dma_target())?;
        fabric.bind_reset(host.clone());

        Self::validate(&config.regions, &host, &controller, &device)?;

        let reset = fabric.reset();
        let mut kernel = Kernel::new();
        fabric.install(&mut kernel);

        info!(
            "Topology ready: {} regions, quantum {}, reset {}",
            config.regions.len(),
            config.quantum,
            config.reset_duration
        );

        Ok(Self {
            kernel,
            keeper,
            host_accesses: 0,
            reset,
            reset_duration: config.reset_duration,
            regions: config.regions.clone(),
            host,
            controller,
            device,
        })
    }

    fn validate(
        regions: &RegionTable,
        host: &HostBridge,
        controller: &PcieController,
        device: &DeviceFacade,
    ) -> Result<(), TopologyError> {
        host.check_bound()?;
        controller.check_bound()?;
        device.check_bound()?;

        for region in regions.iter() {
            if controller.bar_size(region.id) != Some(region.size) {
                return Err(TopologyError::BarMismatch { region: region.id });
            }
        }

        Ok(())
    }

    /// The kernel time.
    #[must_use]
    pub const fn now(&self) -> SimTime {
        self.kernel.now()
    }

    /// The time of the device side, including time not yet synchronized with the kernel.
    #[must_use]
    pub fn local_time(&self) -> SimTime {
        self.keeper.current_time(&self.kernel)
    }

    /// The state of the reset sequence.
    #[must_use]
    pub fn reset_phase(&self) -> ResetPhase {
        self.reset.phase()
    }

    /// The region decode table.
    #[must_use]
    pub const fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// The root port.
    #[must_use]
    pub fn host(&self) -> &HostBridge {
        &self.host
    }

    /// Advance the simulation by `duration`.
    pub fn run_for(&mut self, duration: SimDuration) {
        self.kernel.run_for(duration);
    }

    /// Run until the reset pulse is over.
    pub fn run_reset(&mut self) {
        self.kernel.run_until(SimTime::ZERO + self.reset_duration);
        debug_assert_eq!(self.reset_phase(), ResetPhase::Deasserted);
    }

    /// How many host accesses were performed so far.
    #[must_use]
    pub const fn host_accesses(&self) -> u64 {
        self.host_accesses
    }

    /// Perform a host access and account for the time it consumed.
    pub fn host_access(&mut self, space: Space, trans: &mut Transaction) {
        let mut delay = self.keeper.local_offset();

        self.host.issue(space, trans, &mut delay);
        self.keeper.set(delay);
        self.host_accesses += 1;

        if self.keeper.need_sync() {
            self.keeper.sync(&mut self.kernel);
        }
    }

    /// Run one quantum past the kernel time without host involvement.
    ///
    /// Time the host accesses consumed but the kernel has not caught up with yet is part of that
    /// quantum.
    pub fn advance_quantum(&mut self) {
        let offset = self.keeper.local_offset().max(self.keeper.quantum());

        self.keeper.set(offset);
        self.keeper.sync(&mut self.kernel);
    }

    /// Catch the kernel up with the time the host accesses consumed.
    pub fn flush(&mut self) {
        if !self.keeper.local_offset().is_zero() {
            self.keeper.sync(&mut self.kernel);
        }
    }

    /// Map a vfio-user region index to the address space it addresses.
    fn space(region: u32) -> Option<Space> {
        match region {
            VFIO_PCI_CONFIG_REGION_INDEX => Some(Space::Config),
            VFIO_PCI_BAR0_REGION_INDEX..=VFIO_PCI_BAR5_REGION_INDEX => {
                RegionId::try_from(region).ok().map(Space::Bar)
            }
            _ => None,
        }
    }
}

impl ServerBackend for Top {
    fn region_read(&mut self, region: u32, offset: u64, data: &mut [u8]) -> Result<(), io::Error> {
        let Some(space) = Self::space(region) else {
            warn!("Read from unknown region {region}");
            data.fill(0xff);
            return Ok(());
        };

        let mut trans = Transaction::read(offset, data.len());
        self.host_access(space, &mut trans);

        if trans.is_ok() {
            data.copy_from_slice(trans.data());
        } else {
            // Master abort
            debug!("Read {space:?} {offset:#x} failed: {:?}", trans.status());
            data.fill(0xff);
        }

        Ok(())
    }

    fn region_write(&mut self, region: u32, offset: u64, data: &[u8]) -> Result<(), io::Error> {
        let Some(space) = Self::space(region) else {
            warn!("Write to unknown region {region}");
            return Ok(());
        };

        let mut trans = Transaction::write(offset, data);
        self.host_access(space, &mut trans);

        if !trans.is_ok() {
            debug!("Write {space:?} {offset:#x} dropped: {:?}", trans.status());
        }

        Ok(())
    }

    fn dma_map(
        &mut self,
        flags: DmaMapFlags,
        offset: u64,
        address: u64,
        size: u64,
        fd: Option<File>,
    ) -> Result<(), io::Error> {
        info!("dma_map flags = {flags:?} offset = {offset} address = {address:#x} size = {size:#x}");

        let Some(fd) = fd else {
            return Err(io::Error::other(
                "Host memory without file descriptor is not supported",
            ));
        };

        let access_rights = AccessRights::try_from(flags).map_err(io::Error::other)?;
        let segment = MemorySegment::new_from_fd(&fd, offset, size, access_rights)?;

        self.host
            .memory()
            .add(address, Arc::new(segment))
            .map_err(io::Error::other)
    }

    fn dma_unmap(
        &mut self,
        flags: DmaUnmapFlags,
        address: u64,
        size: u64,
    ) -> Result<(), io::Error> {
        info!("dma_unmap flags = {flags:?} address = {address:#x} size = {size:#x}");

        if !self.host.memory().remove(address) {
            warn!("dma_unmap of {address:#x}, which is not mapped");
        }

        Ok(())
    }

    fn reset(&mut self) -> Result<(), io::Error> {
        // Reset is pulsed exactly once at startup.
        info!("Ignoring device reset requested by the host");
        Ok(())
    }

    fn set_irqs(
        &mut self,
        index: u32,
        flags: u32,
        start: u32,
        count: u32,
        _fds: Vec<File>,
    ) -> Result<(), io::Error> {
        debug!("set_irqs index = {index} flags = {flags:#x} start = {start} count = {count}");

        if count == 0 {
            return Ok(());
        }

        Err(io::Error::other("The endpoint has no interrupts"))
    }
}
