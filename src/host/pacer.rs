//! # Idle Pacing
//!
//! vfio-user carries no simulated time, so the host only moves the device timeline forward by
//! sending requests. While it sends none, the [`IdlePacer`] runs the simulation one quantum per
//! tick of wall-clock time. A device that started work on its own, e.g. DMA after a doorbell
//! write, can then finish it without the host polling.

use std::{
    fs::File,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use tracing::{debug, error, trace};
use vfio_user::{DmaMapFlags, DmaUnmapFlags, ServerBackend};

use crate::topology::Top;

/// The wall-clock time the host has to stay silent before the simulation runs on its own.
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_millis(1);

fn lock(top: &Mutex<Top>) -> io::Result<MutexGuard<'_, Top>> {
    top.lock().map_err(|_| io::Error::other("The simulation panicked"))
}

/// Advances the simulation while the host is idle.
#[derive(Debug)]
pub struct IdlePacer {
    tick: Duration,
    stopped: AtomicBool,
}

impl IdlePacer {
    /// Create a pacer that checks for host activity every `tick`.
    #[must_use]
    pub const fn new(tick: Duration) -> Self {
        Self {
            tick,
            stopped: AtomicBool::new(false),
        }
    }

    /// Make [`IdlePacer::run`] return after its current tick.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Run `top` one quantum for every tick without host accesses, until stopped.
    pub fn run(&self, top: &Mutex<Top>) {
        let mut seen = None;

        while !self.stopped.load(Ordering::Acquire) {
            thread::sleep(self.tick);

            let mut top = match lock(top) {
                Ok(top) => top,
                Err(e) => {
                    error!("Idle pacing stopped: {e}");
                    return;
                }
            };

            let accesses = top.host_accesses();
            if seen == Some(accesses) {
                top.advance_quantum();
                trace!("Host idle, simulation at {}", top.now());
            }
            seen = Some(accesses);
        }

        debug!("Idle pacing stopped");
    }
}

/// The vfio-user backend for a [`Top`] shared with an [`IdlePacer`].
#[derive(Debug)]
pub struct SharedTop<'a> {
    top: &'a Mutex<Top>,
}

impl<'a> SharedTop<'a> {
    /// Serve host requests against `top`.
    #[must_use]
    pub const fn new(top: &'a Mutex<Top>) -> Self {
        Self { top }
    }
}

impl ServerBackend for SharedTop<'_> {
    fn region_read(&mut self, region: u32, offset: u64, data: &mut [u8]) -> io::Result<()> {
        lock(self.top)?.region_read(region, offset, data)
    }

    fn region_write(&mut self, region: u32, offset: u64, data: &[u8]) -> io::Result<()> {
        lock(self.top)?.region_write(region, offset, data)
    }

    fn dma_map(
        &mut self,
        flags: DmaMapFlags,
        offset: u64,
        address: u64,
        size: u64,
        fd: Option<File>,
    ) -> io::Result<()> {
        lock(self.top)?.dma_map(flags, offset, address, size, fd)
    }

    fn dma_unmap(&mut self, flags: DmaUnmapFlags, address: u64, size: u64) -> io::Result<()> {
        lock(self.top)?.dma_unmap(flags, address, size)
    }

    fn reset(&mut self) -> io::Result<()> {
        lock(self.top)?.reset()
    }

    fn set_irqs(
        &mut self,
        index: u32,
        flags: u32,
        start: u32,
        count: u32,
        fds: Vec<File>,
    ) -> io::Result<()> {
        lock(self.top)?.set_irqs(index, flags, start, count, fds)
    }
}
