//! # Reset Sequencing
//!
//! The harness pulses reset exactly once: it is asserted at time zero, held for a fixed duration
//! and then released for the rest of the run. [`ResetSignal`] is the shared, read-only view of this
//! state. Its active-low complement is available via [`ResetSignal::rst_n`].

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU32, AtomicU8, Ordering},
        Arc,
    },
};

use tracing::debug;

use super::{
    kernel::{Process, Resume},
    time::{SimDuration, SimTime},
};

/// The default time reset is held asserted at startup.
pub const DEFAULT_RESET_DURATION: SimDuration = SimDuration::from_us(1);

/// The phases of the reset state machine.
///
/// Transitions only ever go `Idle -> Asserted -> Deasserted`. `Deasserted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResetPhase {
    /// The simulation has not started yet.
    Idle = 0,

    /// Reset is active.
    Asserted = 1,

    /// Reset has been released. Models run normally.
    Deasserted = 2,
}

impl ResetPhase {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Asserted,
            _ => Self::Deasserted,
        }
    }

    const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Asserted),
            Self::Asserted => Some(Self::Deasserted),
            Self::Deasserted => None,
        }
    }
}

/// The observable reset state.
#[derive(Debug)]
pub struct ResetSignal {
    phase: AtomicU8,
    pulses: AtomicU32,
}

impl ResetSignal {
    pub(super) fn new() -> Self {
        Self {
            phase: AtomicU8::new(ResetPhase::Idle as u8),
            pulses: AtomicU32::new(0),
        }
    }

    /// The current phase of the reset state machine.
    #[must_use]
    pub fn phase(&self) -> ResetPhase {
        ResetPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// The active-high reset level.
    #[must_use]
    pub fn is_asserted(&self) -> bool {
        self.phase() == ResetPhase::Asserted
    }

    /// The active-low reset level, i.e. the logical complement of [`Self::is_asserted`].
    #[must_use]
    pub fn rst_n(&self) -> bool {
        !self.is_asserted()
    }

    /// The number of times reset was asserted. This is at most one.
    #[must_use]
    pub fn pulses(&self) -> u32 {
        self.pulses.load(Ordering::Relaxed)
    }

    /// Move to the next phase, if there is one.
    fn advance(&self) -> Option<ResetPhase> {
        let next = self.phase().next()?;

        if next == ResetPhase::Asserted {
            self.pulses.fetch_add(1, Ordering::Relaxed);
        }

        self.phase.store(next as u8, Ordering::Release);
        Some(next)
    }
}

/// A model that reacts to reset.
///
/// Implementors must be in a defined state when they see reset deasserted.
pub trait ResetSink: Debug + Send + Sync {
    /// Reset changed its level at `now`.
    fn reset_changed(&self, asserted: bool, now: SimTime);
}

/// The process driving the single reset pulse.
#[derive(Debug)]
pub(super) struct ResetSequencer {
    signal: Arc<ResetSignal>,
    duration: SimDuration,
    sinks: Vec<Arc<dyn ResetSink>>,
}

impl ResetSequencer {
    pub(super) fn new(
        signal: Arc<ResetSignal>,
        duration: SimDuration,
        sinks: Vec<Arc<dyn ResetSink>>,
    ) -> Self {
        Self {
            signal,
            duration,
            sinks,
        }
    }

    fn notify(&self, asserted: bool, now: SimTime) {
        for sink in &self.sinks {
            sink.reset_changed(asserted, now);
        }
    }
}

impl Process for ResetSequencer {
    fn name(&self) -> &str {
        "reset"
    }

    fn resume(&mut self, now: SimTime) -> Resume {
        match self.signal.advance() {
            Some(ResetPhase::Asserted) => {
                debug!("reset asserted at {now}");
                self.notify(true, now);
                Resume::After(self.duration)
            }
            Some(ResetPhase::Deasserted) => {
                debug!("reset deasserted at {now}");
                self.notify(false, now);
                Resume::Finished
            }
            Some(ResetPhase::Idle) | None => Resume::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::sim::kernel::Kernel;

    #[derive(Debug, Default)]
    struct Observer {
        seen: Mutex<Vec<(bool, SimTime)>>,
    }

    impl ResetSink for Observer {
        fn reset_changed(&self, asserted: bool, now: SimTime) {
            self.seen.lock().unwrap().push((asserted, now));
        }
    }

    #[test]
    fn phases_only_move_forward() {
        let signal = ResetSignal::new();

        assert_eq!(signal.phase(), ResetPhase::Idle);
        assert!(signal.rst_n());
        assert_eq!(signal.advance(), Some(ResetPhase::Asserted));
        assert!(!signal.rst_n());
        assert_eq!(signal.advance(), Some(ResetPhase::Deasserted));
        assert_eq!(signal.advance(), None);
        assert_eq!(signal.phase(), ResetPhase::Deasserted);
        assert_eq!(signal.pulses(), 1);
    }

    #[test]
    fn sequencer_pulses_reset_once_for_the_configured_duration() {
        let signal = Arc::new(ResetSignal::new());
        let observer = Arc::new(Observer::default());
        let sinks: Vec<Arc<dyn ResetSink>> = vec![observer.clone()];
        let mut kernel = Kernel::new();

        kernel.spawn(Box::new(ResetSequencer::new(
            signal.clone(),
            DEFAULT_RESET_DURATION,
            sinks,
        )));

        kernel.run_until(SimTime::from_ps(999_999));
        assert!(signal.is_asserted());

        kernel.run_until(SimTime::from_ps(1_000_000));
        assert_eq!(signal.phase(), ResetPhase::Deasserted);

        kernel.run_for(SimDuration::from_us(100));
        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec![(true, SimTime::ZERO), (false, SimTime::from_ps(1_000_000))]
        );
        assert_eq!(signal.pulses(), 1);
        assert!(kernel.is_idle());
    }
}
