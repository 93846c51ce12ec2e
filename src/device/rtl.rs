//! # Idle User Logic
//!
//! A stand-in for the compiled user design. It has the pins of the real design but does nothing
//! except observe them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    config::domain,
    sim::{
        clock::{ClockInput, Clocked},
        reset::ResetSink,
        time::SimTime,
    },
};

use super::bridge::RtlModel;

/// The clock pin in the fast domain.
pub const CLK: &str = "CLK";

/// The clock pin in the slow domain.
pub const CLK_SLOW: &str = "CLK_slowClock";

/// User logic that only counts clock edges and follows reset.
#[derive(Debug)]
pub struct IdleRtlModel {
    fast_posedges: AtomicU64,
    slow_posedges: AtomicU64,
    rst_n: AtomicBool,
    rst_n_slow_reset: AtomicBool,
}

impl Default for IdleRtlModel {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleRtlModel {
    /// Create the model with both reset pins released.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fast_posedges: AtomicU64::new(0),
            slow_posedges: AtomicU64::new(0),
            rst_n: AtomicBool::new(true),
            rst_n_slow_reset: AtomicBool::new(true),
        }
    }

    /// Rising edges seen on [`CLK`].
    #[must_use]
    pub fn fast_posedges(&self) -> u64 {
        self.fast_posedges.load(Ordering::Relaxed)
    }

    /// Rising edges seen on [`CLK_SLOW`].
    #[must_use]
    pub fn slow_posedges(&self) -> u64 {
        self.slow_posedges.load(Ordering::Relaxed)
    }

    /// The level of the `RST_N` pin.
    #[must_use]
    pub fn rst_n(&self) -> bool {
        self.rst_n.load(Ordering::Relaxed)
    }

    /// The level of the `RST_N_slowReset` pin.
    #[must_use]
    pub fn rst_n_slow_reset(&self) -> bool {
        self.rst_n_slow_reset.load(Ordering::Relaxed)
    }
}

impl Clocked for IdleRtlModel {
    fn clock_inputs(&self) -> Vec<ClockInput> {
        vec![
            ClockInput {
                pin: CLK,
                domain: domain::FAST,
            },
            ClockInput {
                pin: CLK_SLOW,
                domain: domain::SLOW,
            },
        ]
    }

    fn clock_edge(&self, pin: &'static str, rising: bool, _now: SimTime) {
        if !rising {
            return;
        }

        match pin {
            CLK => self.fast_posedges.fetch_add(1, Ordering::Relaxed),
            CLK_SLOW => self.slow_posedges.fetch_add(1, Ordering::Relaxed),
            _ => return,
        };
    }
}

impl ResetSink for IdleRtlModel {
    fn reset_changed(&self, asserted: bool, _now: SimTime) {
        // Both reset pins are active low and driven by the same pulse.
        self.rst_n.store(!asserted, Ordering::Relaxed);
        self.rst_n_slow_reset.store(!asserted, Ordering::Relaxed);
    }
}

impl RtlModel for IdleRtlModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_counted_per_pin() {
        let rtl = IdleRtlModel::new();

        rtl.clock_edge(CLK, true, SimTime::ZERO);
        rtl.clock_edge(CLK, false, SimTime::from_ps(5_000));
        rtl.clock_edge(CLK, true, SimTime::from_ps(10_000));
        rtl.clock_edge(CLK_SLOW, true, SimTime::ZERO);

        assert_eq!(rtl.fast_posedges(), 2);
        assert_eq!(rtl.slow_posedges(), 1);
    }

    #[test]
    fn reset_pins_are_active_low() {
        let rtl = IdleRtlModel::new();
        assert!(rtl.rst_n());

        rtl.reset_changed(true, SimTime::ZERO);
        assert!(!rtl.rst_n());
        assert!(!rtl.rst_n_slow_reset());

        rtl.reset_changed(false, SimTime::from_ps(1_000_000));
        assert!(rtl.rst_n());
        assert!(rtl.rst_n_slow_reset());
    }

    #[test]
    fn one_clock_input_per_domain() {
        let domains: Vec<_> = IdleRtlModel::new()
            .clock_inputs()
            .iter()
            .map(|input| input.domain)
            .collect();

        assert_eq!(domains, vec![domain::FAST, domain::SLOW]);
    }
}
