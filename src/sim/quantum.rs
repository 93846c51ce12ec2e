//! # Time Quantum Keeping
//!
//! The harness does not lock-step with the host simulator. Instead, transaction handlers annotate
//! how much simulated time they consumed and the [`QuantumKeeper`] accumulates this local offset.
//! Once the offset reaches the global quantum, the kernel has to be synchronized: it runs up to
//! the local time and the offset starts over. The quantum therefore bounds how far the device
//! side may run ahead before it reconciles its timeline.

use thiserror::Error;
use tracing::trace;

use super::{
    kernel::Kernel,
    time::{SimDuration, SimTime},
};

/// The quantum used when none is configured.
pub const DEFAULT_QUANTUM: SimDuration = SimDuration::from_ns(10_000);

/// Errors when configuring the quantum.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumError {
    /// A quantum of zero would force a synchronization on every annotation.
    #[error("The synchronization quantum must not be zero")]
    Zero,
}

/// Tracks the local time offset of the device side relative to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumKeeper {
    quantum: SimDuration,
    local_offset: SimDuration,
    syncs: u64,
}

impl QuantumKeeper {
    /// Create a keeper with the given global quantum.
    pub fn new(quantum: SimDuration) -> Result<Self, QuantumError> {
        if quantum.is_zero() {
            return Err(QuantumError::Zero);
        }

        Ok(Self {
            quantum,
            local_offset: SimDuration::ZERO,
            syncs: 0,
        })
    }

    /// The global quantum.
    #[must_use]
    pub const fn quantum(&self) -> SimDuration {
        self.quantum
    }

    /// The offset of the local time relative to the kernel time.
    #[must_use]
    pub const fn local_offset(&self) -> SimDuration {
        self.local_offset
    }

    /// The local time given the kernel's current time.
    #[must_use]
    pub fn current_time(&self, kernel: &Kernel) -> SimTime {
        kernel.now() + self.local_offset
    }

    /// How many synchronizations happened so far.
    #[must_use]
    pub const fn syncs(&self) -> u64 {
        self.syncs
    }

    /// Add consumed time to the local offset.
    pub fn inc(&mut self, delay: SimDuration) {
        self.local_offset += delay;
    }

    /// Replace the local offset, e.g. with a `delay` returned from a transaction.
    pub fn set(&mut self, offset: SimDuration) {
        self.local_offset = offset;
    }

    /// Returns `true` if the local offset reached the quantum.
    #[must_use]
    pub fn need_sync(&self) -> bool {
        self.local_offset >= self.quantum
    }

    /// Run the kernel up to the local time and clear the local offset.
    pub fn sync(&mut self, kernel: &mut Kernel) {
        let target = self.current_time(kernel);

        trace!("quantum sync: {} -> {}", kernel.now(), target);
        kernel.run_until(target);

        self.local_offset = SimDuration::ZERO;
        self.syncs += 1;
    }
}

impl Default for QuantumKeeper {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            local_offset: SimDuration::ZERO,
            syncs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantum_is_rejected() {
        assert_eq!(
            QuantumKeeper::new(SimDuration::ZERO),
            Err(QuantumError::Zero)
        );
    }

    #[test]
    fn sync_is_needed_once_the_quantum_is_reached() {
        let mut kernel = Kernel::new();
        let mut keeper = QuantumKeeper::new(SimDuration::from_ns(100)).unwrap();

        keeper.inc(SimDuration::from_ns(60));
        assert!(!keeper.need_sync());
        assert_eq!(keeper.current_time(&kernel), SimTime::from_ps(60_000));

        keeper.inc(SimDuration::from_ns(40));
        assert!(keeper.need_sync());

        keeper.sync(&mut kernel);
        assert_eq!(kernel.now(), SimTime::from_ps(100_000));
        assert_eq!(keeper.local_offset(), SimDuration::ZERO);
        assert_eq!(keeper.syncs(), 1);
    }

    #[test]
    fn default_quantum_is_ten_microseconds() {
        assert_eq!(QuantumKeeper::default().quantum(), SimDuration::from_us(10));
    }
}
