//! # Harness Configuration
//!
//! The fixed shape of the simulated endpoint and the knobs the command line exposes.

use crate::{
    device::region::{Access, RegionId, RegionKind, RegionTable, RegionTableBuilder},
    error::TopologyError,
    sim::{
        clock::ClockDomain,
        quantum::QuantumKeeper,
        reset::DEFAULT_RESET_DURATION,
        time::SimDuration,
    },
};

/// The names of the clock domains.
pub mod domain {
    /// The fast clock driving the user logic.
    pub const FAST: &str = "clock";

    /// The slow clock shared by the bridge and the user logic.
    pub const SLOW: &str = "slow_clock";
}

/// The period of the fast clock.
pub const FAST_CLOCK_PERIOD: SimDuration = SimDuration::from_ns(10);

/// The period of the slow clock.
pub const SLOW_CLOCK_PERIOD: SimDuration = SimDuration::from_ns(20);

/// The BAR of the user logic.
pub const USER_BAR_ID: RegionId = 0;

/// The BAR of the bridge's configuration and DMA registers.
pub const CONFIG_BAR_ID: RegionId = 1;

/// The size of each BAR.
pub const BAR_SIZE: u32 = 256 * 1024;

/// Everything needed to assemble a topology.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// How far the device side may run ahead of the kernel.
    pub quantum: SimDuration,

    /// How long reset is held at startup.
    pub reset_duration: SimDuration,

    /// The clock domains.
    pub clocks: Vec<ClockDomain>,

    /// The region decode table.
    pub regions: RegionTable,
}

impl HarnessConfig {
    /// The standard endpoint with the given synchronization quantum.
    pub fn new(quantum: SimDuration) -> Result<Self, TopologyError> {
        QuantumKeeper::new(quantum)?;

        Ok(Self {
            quantum,
            reset_duration: DEFAULT_RESET_DURATION,
            clocks: vec![
                ClockDomain::new(domain::FAST, FAST_CLOCK_PERIOD, SimDuration::ZERO)?,
                ClockDomain::new(domain::SLOW, SLOW_CLOCK_PERIOD, SimDuration::ZERO)?,
            ],
            regions: RegionTableBuilder::new()
                .region(USER_BAR_ID, RegionKind::UserBar, BAR_SIZE, Access::ReadWrite)
                .region(CONFIG_BAR_ID, RegionKind::Config, BAR_SIZE, Access::ReadWrite)
                .build()?,
        })
    }

    /// The access latency of the scratchpad bridge: one cycle of the slow clock.
    #[must_use]
    pub fn bridge_latency(&self) -> SimDuration {
        self.clocks
            .iter()
            .find(|c| c.name() == domain::SLOW)
            .map_or(SLOW_CLOCK_PERIOD, ClockDomain::period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::quantum::{QuantumError, DEFAULT_QUANTUM};

    #[test]
    fn defaults_describe_the_standard_endpoint() {
        let config = HarnessConfig::new(DEFAULT_QUANTUM).unwrap();

        assert_eq!(config.quantum, SimDuration::from_us(10));
        assert_eq!(config.reset_duration, SimDuration::from_us(1));
        assert_eq!(config.bridge_latency(), SimDuration::from_ns(20));
        assert_eq!(
            config
                .regions
                .iter()
                .map(|r| (r.id, r.kind, r.size))
                .collect::<Vec<_>>(),
            vec![
                (0, RegionKind::UserBar, 0x40000),
                (1, RegionKind::Config, 0x40000)
            ]
        );
    }

    #[test]
    fn zero_quantum_is_rejected() {
        assert_eq!(
            HarnessConfig::new(SimDuration::ZERO).unwrap_err(),
            TopologyError::Quantum(QuantumError::Zero)
        );
    }
}
