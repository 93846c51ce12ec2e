//! # Simulated Time
//!
//! All simulated time is kept in picoseconds, the resolution the harness runs at. [`SimTime`] is an
//! absolute point on the single global timeline, [`SimDuration`] is a distance between two such
//! points (and the unit of the `delay` annotation threaded through bus transactions).

use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, AddAssign, Sub},
};

const PS_PER_NS: u64 = 1_000;
const PS_PER_US: u64 = 1_000_000;

/// A span of simulated time with picosecond resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimDuration(u64);

impl SimDuration {
    /// The empty duration.
    pub const ZERO: Self = Self(0);

    /// Construct a duration from picoseconds.
    #[must_use]
    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    /// Construct a duration from nanoseconds. Saturates at the largest representable duration.
    #[must_use]
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns.saturating_mul(PS_PER_NS))
    }

    /// Construct a duration from microseconds. Saturates at the largest representable duration.
    #[must_use]
    pub const fn from_us(us: u64) -> Self {
        Self(us.saturating_mul(PS_PER_US))
    }

    /// The duration in picoseconds.
    #[must_use]
    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// Returns `true` if this duration is empty.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for SimDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimDuration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for SimDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// Print with the largest unit that represents the value exactly.
fn fmt_ps(ps: u64, f: &mut Formatter<'_>) -> fmt::Result {
    if ps != 0 && ps % PS_PER_US == 0 {
        write!(f, "{} us", ps / PS_PER_US)
    } else if ps != 0 && ps % PS_PER_NS == 0 {
        write!(f, "{} ns", ps / PS_PER_NS)
    } else {
        write!(f, "{ps} ps")
    }
}

impl Display for SimDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_ps(self.0, f)
    }
}

/// An absolute point in simulated time, measured from the start of the simulation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of the simulation.
    pub const ZERO: Self = Self(0);

    /// Construct a point in time from picoseconds since the start of the simulation.
    #[must_use]
    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    /// Picoseconds since the start of the simulation.
    #[must_use]
    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// The time that has passed since `earlier`, or zero if `earlier` lies in the future.
    #[must_use]
    pub const fn since(self, earlier: Self) -> SimDuration {
        SimDuration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<SimDuration> for SimTime {
    type Output = Self;

    fn add(self, rhs: SimDuration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, rhs: SimDuration) {
        *self = *self + rhs;
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_ps(self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_convert_to_picoseconds() {
        assert_eq!(SimDuration::from_ns(10).as_ps(), 10_000);
        assert_eq!(SimDuration::from_us(1).as_ps(), 1_000_000);
        assert_eq!(SimDuration::from_ns(1_000), SimDuration::from_us(1));
    }

    #[test]
    fn arithmetic_saturates() {
        let max = SimTime::from_ps(u64::MAX);

        assert_eq!(max + SimDuration::from_ps(1), max);
        assert_eq!(
            SimDuration::from_ps(1) - SimDuration::from_ps(2),
            SimDuration::ZERO
        );
        assert_eq!(SimTime::ZERO.since(max), SimDuration::ZERO);
    }

    #[test]
    fn display_picks_exact_unit() {
        assert_eq!(SimDuration::from_us(1).to_string(), "1 us");
        assert_eq!(SimDuration::from_ns(20).to_string(), "20 ns");
        assert_eq!(SimDuration::from_ps(1).to_string(), "1 ps");
        assert_eq!(SimTime::ZERO.to_string(), "0 ps");
        assert_eq!(SimTime::from_ps(1_500).to_string(), "1500 ps");
    }
}
