//! # Discrete-Event Kernel
//!
//! A deliberately small scheduler: processes are resumed in order of their activation time, with
//! ties broken by the order in which the activations were scheduled. There is no parallelism; a
//! process runs to completion of its current step before the next one is resumed.
//!
//! The composition in this crate only needs timed activations (clock edges and the reset pulse).
//! Bus transactions are plain synchronous calls that annotate a `delay`, which the
//! [`QuantumKeeper`](super::quantum::QuantumKeeper) folds back into the timeline.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    fmt::Debug,
};

use tracing::trace;

use super::time::{SimDuration, SimTime};

/// What a process wants after it was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Resume the process again after the given duration.
    After(SimDuration),

    /// The process has nothing left to do.
    Finished,
}

/// A scheduled process of the simulation.
pub trait Process: Debug + Send {
    /// A name for diagnostics.
    fn name(&self) -> &str;

    /// Run the process at the current simulated time `now`.
    fn resume(&mut self, now: SimTime) -> Resume;
}

/// Index of a process inside the [`Kernel`].
pub type ProcessId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Activation {
    time: SimTime,

    /// Monotonic insertion counter to keep activations at the same time in FIFO order.
    seq: u64,

    process: ProcessId,
}

impl Ord for Activation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Activation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The simulation kernel owning all processes and the current simulated time.
#[derive(Debug, Default)]
pub struct Kernel {
    now: SimTime,
    queue: BinaryHeap<Reverse<Activation>>,
    processes: Vec<Box<dyn Process>>,
    next_seq: u64,
    activations: u64,
}

impl Kernel {
    /// Create a kernel at time zero without any processes.
    #[must_use]
    pub fn new() -> Self {
        Default::default()
    }

    /// The current simulated time.
    #[must_use]
    pub const fn now(&self) -> SimTime {
        self.now
    }

    /// The total number of process activations executed so far.
    #[must_use]
    pub const fn activations(&self) -> u64 {
        self.activations
    }

    /// Returns `true` if no process is waiting to be resumed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// The time of the next pending activation, if any.
    #[must_use]
    pub fn next_activation(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(a)| a.time)
    }

    /// Add a process that is first resumed at the current time.
    pub fn spawn(&mut self, process: Box<dyn Process>) -> ProcessId {
        let id = self.processes.len();

        trace!("spawning process {} as #{id} at {}", process.name(), self.now);
        self.processes.push(process);
        self.schedule(self.now, id);

        id
    }

    fn schedule(&mut self, time: SimTime, process: ProcessId) {
        let seq = self.next_seq;

        self.next_seq += 1;
        self.queue.push(Reverse(Activation { time, seq, process }));
    }

    /// Run every activation that is due at or before `until`, then move the current time to
    /// `until`.
    ///
    /// Time never moves backwards. Calling this with a point in the past does nothing.
    pub fn run_until(&mut self, until: SimTime) {
        if until < self.now {
            return;
        }

        while let Some(&Reverse(activation)) = self.queue.peek() {
            if activation.time > until {
                break;
            }

            self.queue.pop();
            self.now = activation.time;
            self.activations += 1;

            let process = &mut self.processes[activation.process];
            match process.resume(self.now) {
                Resume::After(delta) => self.schedule(self.now + delta, activation.process),
                Resume::Finished => trace!("process {} finished at {}", process.name(), self.now),
            }
        }

        self.now = until;
    }

    /// Advance the simulation by `duration`. See [`Kernel::run_until`].
    pub fn run_for(&mut self, duration: SimDuration) {
        self.run_until(self.now + duration);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records the times it was resumed at and wants to run every `period`, `count` times.
    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        period: SimDuration,
        count: usize,
        log: Arc<Mutex<Vec<(&'static str, SimTime)>>>,
    }

    impl Process for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn resume(&mut self, now: SimTime) -> Resume {
            self.log.lock().unwrap().push((self.name, now));
            self.count -= 1;

            if self.count == 0 {
                Resume::Finished
            } else {
                Resume::After(self.period)
            }
        }
    }

    #[test]
    fn activations_run_in_time_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut kernel = Kernel::new();

        kernel.spawn(Box::new(Recorder {
            name: "slow",
            period: SimDuration::from_ns(20),
            count: 3,
            log: log.clone(),
        }));
        kernel.spawn(Box::new(Recorder {
            name: "fast",
            period: SimDuration::from_ns(10),
            count: 3,
            log: log.clone(),
        }));

        kernel.run_until(SimTime::from_ps(100_000));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("slow", SimTime::ZERO),
                ("fast", SimTime::ZERO),
                ("fast", SimTime::from_ps(10_000)),
                ("slow", SimTime::from_ps(20_000)),
                ("fast", SimTime::from_ps(20_000)),
                ("slow", SimTime::from_ps(40_000)),
            ]
        );
        assert!(kernel.is_idle());
        assert_eq!(kernel.now(), SimTime::from_ps(100_000));
    }

    #[test]
    fn run_until_includes_the_end_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut kernel = Kernel::new();

        kernel.spawn(Box::new(Recorder {
            name: "p",
            period: SimDuration::from_ns(10),
            count: 10,
            log: log.clone(),
        }));

        kernel.run_for(SimDuration::from_ns(10));
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(kernel.next_activation(), Some(SimTime::from_ps(20_000)));

        // Time does not move backwards.
        kernel.run_until(SimTime::ZERO);
        assert_eq!(kernel.now(), SimTime::from_ps(10_000));
        assert_eq!(kernel.activations(), 2);
    }
}
