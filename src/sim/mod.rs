//! # Simulation Primitives
//!
//! The pieces of a discrete-event simulation the composition needs: picosecond [time], a small
//! [kernel] with timed processes, [clock] domains, the one-shot [reset] pulse, the [fabric] that
//! distributes both, and the [quantum] keeper that bounds how far the device side runs ahead.

pub mod clock;
pub mod fabric;
pub mod kernel;
pub mod quantum;
pub mod reset;
pub mod time;
