//! # Clock/Reset Fabric
//!
//! The fabric owns every clock signal and the reset signal. Models are bound to it during
//! construction: [`Clocked`] models get their declared inputs connected to the named domains and
//! [`ResetSink`]s are told about the reset pulse. [`ClockResetFabric::install`] finally hands the
//! driver processes to the kernel.

use std::sync::Arc;

use tracing::debug;

use crate::error::TopologyError;

use super::{
    clock::{ClockBinding, ClockDomain, ClockDriver, ClockError, ClockSignal, Clocked},
    kernel::Kernel,
    reset::{ResetSequencer, ResetSignal, ResetSink},
    time::SimDuration,
};

#[derive(Debug)]
struct DomainEntry {
    signal: Arc<ClockSignal>,
    bindings: Vec<ClockBinding>,
}

/// The clocks and the reset of the simulated system.
#[derive(Debug)]
pub struct ClockResetFabric {
    domains: Vec<DomainEntry>,
    reset: Arc<ResetSignal>,
    reset_duration: SimDuration,
    reset_sinks: Vec<Arc<dyn ResetSink>>,
}

impl ClockResetFabric {
    /// Create a fabric without clocks whose reset pulse lasts `reset_duration`.
    #[must_use]
    pub fn new(reset_duration: SimDuration) -> Self {
        Self {
            domains: Vec::new(),
            reset: Arc::new(ResetSignal::new()),
            reset_duration,
            reset_sinks: Vec::new(),
        }
    }

    /// Add a clock domain and return its signal.
    pub fn add_domain(&mut self, domain: ClockDomain) -> Result<Arc<ClockSignal>, ClockError> {
        if self.domain(domain.name()).is_some() {
            return Err(ClockError::DuplicateDomain {
                name: domain.name().to_string(),
            });
        }

        debug!(
            "clock domain {}: period {}, phase {}",
            domain.name(),
            domain.period(),
            domain.phase()
        );

        let signal = Arc::new(ClockSignal::new(domain));
        self.domains.push(DomainEntry {
            signal: signal.clone(),
            bindings: Vec::new(),
        });

        Ok(signal)
    }

    /// Look up the signal of a clock domain.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<Arc<ClockSignal>> {
        self.domains
            .iter()
            .find(|e| e.signal.domain().name() == name)
            .map(|e| e.signal.clone())
    }

    /// The shared reset signal.
    #[must_use]
    pub fn reset(&self) -> Arc<ResetSignal> {
        self.reset.clone()
    }

    /// The time reset stays asserted.
    #[must_use]
    pub const fn reset_duration(&self) -> SimDuration {
        self.reset_duration
    }

    /// Connect all clock inputs a model declares.
    ///
    /// Either all inputs are bound or, if one of them names an unknown domain, none is.
    pub fn bind_clocks(&mut self, model: Arc<dyn Clocked>) -> Result<(), TopologyError> {
        let inputs = model.clock_inputs();

        let targets = inputs
            .iter()
            .map(|input| {
                self.domains
                    .iter()
                    .position(|e| e.signal.domain().name() == input.domain)
                    .ok_or(TopologyError::MissingClockDomain {
                        pin: input.pin,
                        domain: input.domain,
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        for (input, target) in inputs.iter().zip(targets) {
            debug!("binding clock input {} to {}", input.pin, input.domain);
            self.domains[target]
                .bindings
                .push((model.clone(), input.pin));
        }

        Ok(())
    }

    /// Connect a model to the reset signal.
    pub fn bind_reset(&mut self, sink: Arc<dyn ResetSink>) {
        self.reset_sinks.push(sink);
    }

    /// Number of clock inputs bound to the named domain.
    #[must_use]
    pub fn bound_inputs(&self, domain: &str) -> usize {
        self.domains
            .iter()
            .find(|e| e.signal.domain().name() == domain)
            .map_or(0, |e| e.bindings.len())
    }

    /// Hand the reset sequencer and clock drivers to the kernel.
    ///
    /// The reset sequencer is spawned first, so models already see reset asserted at the first
    /// clock edge at time zero.
    pub fn install(self, kernel: &mut Kernel) {
        kernel.spawn(Box::new(ResetSequencer::new(
            self.reset,
            self.reset_duration,
            self.reset_sinks,
        )));

        for entry in self.domains {
            kernel.spawn(Box::new(ClockDriver::new(entry.signal, entry.bindings)));
        }
    }
}
