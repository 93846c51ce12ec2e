//! # Clock Domains
//!
//! A [`ClockDomain`] describes a clock by name, period and phase. The fabric turns each domain
//! into a [`ClockSignal`] that models observe and a driver process that toggles it. Only the
//! driver can change the signal level; models implementing [`Clocked`] are told about every edge.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use thiserror::Error;
use tracing::trace;

use super::{
    kernel::{Process, Resume},
    time::{SimDuration, SimTime},
};

/// Errors in a clock domain description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// A clock that never toggles.
    #[error("Clock domain {name} has a period of zero")]
    ZeroPeriod {
        /// The name of the domain.
        name: String,
    },

    /// The period cannot be split into two equal halves at picosecond resolution.
    #[error("Clock domain {name} has an odd period of {period}")]
    OddPeriod {
        /// The name of the domain.
        name: String,
        /// The offending period.
        period: SimDuration,
    },

    /// Two domains share a name.
    #[error("Clock domain {name} is declared twice")]
    DuplicateDomain {
        /// The name of the domain.
        name: String,
    },
}

/// The static description of a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDomain {
    name: String,
    period: SimDuration,
    phase: SimDuration,
}

impl ClockDomain {
    /// Describe a clock whose first rising edge is at `phase`.
    pub fn new(
        name: impl Into<String>,
        period: SimDuration,
        phase: SimDuration,
    ) -> Result<Self, ClockError> {
        let name = name.into();

        if period.is_zero() {
            return Err(ClockError::ZeroPeriod { name });
        }

        if period.as_ps() % 2 != 0 {
            return Err(ClockError::OddPeriod { name, period });
        }

        Ok(Self {
            name,
            period,
            phase,
        })
    }

    /// The name models use to refer to this domain.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full clock period.
    #[must_use]
    pub const fn period(&self) -> SimDuration {
        self.period
    }

    /// The time of the first rising edge.
    #[must_use]
    pub const fn phase(&self) -> SimDuration {
        self.phase
    }

    fn half_period(&self) -> SimDuration {
        SimDuration::from_ps(self.period.as_ps() / 2)
    }
}

/// The observable state of a clock domain.
///
/// Models get a shared reference to this. There is no public way to change the level.
#[derive(Debug)]
pub struct ClockSignal {
    domain: ClockDomain,
    level: AtomicBool,
    posedges: AtomicU64,
}

impl ClockSignal {
    pub(super) fn new(domain: ClockDomain) -> Self {
        Self {
            domain,
            level: AtomicBool::new(false),
            posedges: AtomicU64::new(0),
        }
    }

    /// The domain this signal belongs to.
    #[must_use]
    pub const fn domain(&self) -> &ClockDomain {
        &self.domain
    }

    /// The current level of the clock.
    #[must_use]
    pub fn level(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }

    /// The number of rising edges so far.
    #[must_use]
    pub fn posedges(&self) -> u64 {
        self.posedges.load(Ordering::Relaxed)
    }

    /// Flip the level and return the new one.
    fn toggle(&self) -> bool {
        let rising = !self.level.fetch_xor(true, Ordering::Relaxed);

        if rising {
            self.posedges.fetch_add(1, Ordering::Relaxed);
        }

        rising
    }
}

/// A clock input of a model and the domain that has to drive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockInput {
    /// The name of the input pin on the model.
    pub pin: &'static str,

    /// The name of the [`ClockDomain`] driving the pin.
    pub domain: &'static str,
}

/// A model that is driven by one or more clocks.
pub trait Clocked: Debug + Send + Sync {
    /// The clock inputs of this model. This must not change after construction.
    fn clock_inputs(&self) -> Vec<ClockInput>;

    /// An edge on the clock connected to `pin`.
    fn clock_edge(&self, pin: &'static str, rising: bool, now: SimTime);
}

/// A model input connected to a clock signal.
pub(super) type ClockBinding = (Arc<dyn Clocked>, &'static str);

/// The process that toggles one clock signal and notifies every bound input.
#[derive(Debug)]
pub(super) struct ClockDriver {
    name: String,
    signal: Arc<ClockSignal>,
    bindings: Vec<ClockBinding>,
    started: bool,
}

impl ClockDriver {
    pub(super) fn new(signal: Arc<ClockSignal>, bindings: Vec<ClockBinding>) -> Self {
        Self {
            name: format!("clock:{}", signal.domain().name()),
            signal,
            bindings,
            started: false,
        }
    }
}

impl Process for ClockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, now: SimTime) -> Resume {
        let domain = self.signal.domain();

        if !self.started {
            self.started = true;

            if !domain.phase().is_zero() {
                return Resume::After(domain.phase());
            }
        }

        let rising = self.signal.toggle();

        trace!(
            "{} {} edge at {now}",
            domain.name(),
            if rising { "rising" } else { "falling" }
        );

        // Everyone in the domain observes the edge at the same `now`.
        for (model, pin) in &self.bindings {
            model.clock_edge(*pin, rising, now);
        }

        Resume::After(domain.half_period())
    }
}
