//! # Scratchpad Bridge
//!
//! A stand-in for the compiled PCIe bridge design. Each BAR is backed by a small RAM that is
//! mirrored across the whole BAR window. Accesses cost a fixed latency. DMA is issued on demand
//! through the regular DMA-initiator socket, so it takes the same path through the topology as
//! DMA from a real bridge would.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use tracing::{debug, trace};

use crate::{
    config::domain,
    sim::{
        clock::{ClockInput, Clocked},
        reset::ResetSink,
        time::{SimDuration, SimTime},
    },
};

use super::{
    bridge::BridgeModel,
    region::RegionKind,
    transaction::{
        Command, InitiatorSocket, ResponseStatus, TargetRef, Transaction, TransactionTarget,
    },
};

/// The amount of RAM behind each BAR.
pub const SCRATCHPAD_SIZE: usize = 32 * 1024;

/// The clock input of the bridge.
pub const CLOCK_PIN: &str = "axi_aclk";

/// RAM mirrored across a BAR window.
#[derive(Debug)]
struct BarMemory {
    name: &'static str,
    bytes: Mutex<Vec<u8>>,
    latency: SimDuration,
}

impl BarMemory {
    fn new(name: &'static str, latency: SimDuration) -> Self {
        Self {
            name,
            bytes: Mutex::new(vec![0; SCRATCHPAD_SIZE]),
            latency,
        }
    }

    fn clear(&self) {
        self.bytes.lock().unwrap().fill(0);
    }
}

/// The RAM index an address in the BAR window aliases to.
fn mirror(base: u64, index: usize) -> usize {
    // The remainder is below SCRATCHPAD_SIZE and always fits.
    (base.wrapping_add(index as u64) % SCRATCHPAD_SIZE as u64) as usize
}

impl TransactionTarget for BarMemory {
    fn b_transport(&self, trans: &mut Transaction, delay: &mut SimDuration) {
        let mut bytes = self.bytes.lock().unwrap();
        let base = trans.address();

        match trans.command() {
            Command::Read => {
                for (i, byte) in trans.data_mut().iter_mut().enumerate() {
                    *byte = bytes[mirror(base, i)];
                }
            }
            Command::Write => {
                for (i, byte) in trans.data().iter().enumerate() {
                    bytes[mirror(base, i)] = *byte;
                }
            }
        }

        trace!(
            "{}: {} {:#x}+{:x}",
            self.name,
            trans.command(),
            base,
            trans.len()
        );

        *delay += self.latency;
        trans.set_status(ResponseStatus::Ok);
    }
}

/// A bridge model with RAM behind its BARs.
#[derive(Debug)]
pub struct ScratchpadBridge {
    user: Arc<BarMemory>,
    config: Arc<BarMemory>,
    dma: InitiatorSocket<dyn TransactionTarget>,
    in_reset: AtomicBool,
    posedges: AtomicU64,
}

impl ScratchpadBridge {
    /// Create a bridge whose BAR accesses take `latency` each.
    #[must_use]
    pub fn new(latency: SimDuration) -> Self {
        Self {
            user: Arc::new(BarMemory::new("scratchpad.user", latency)),
            config: Arc::new(BarMemory::new("scratchpad.config", latency)),
            dma: InitiatorSocket::new("scratchpad.dma"),
            in_reset: AtomicBool::new(false),
            posedges: AtomicU64::new(0),
        }
    }

    /// The number of rising edges seen on the bridge clock.
    #[must_use]
    pub fn posedges(&self) -> u64 {
        self.posedges.load(Ordering::Relaxed)
    }

    /// Returns `true` while the bridge is held in reset.
    #[must_use]
    pub fn in_reset(&self) -> bool {
        self.in_reset.load(Ordering::Relaxed)
    }

    /// Write `data` to host memory at `address`.
    pub fn dma_write(&self, address: u64, data: &[u8], delay: &mut SimDuration) -> ResponseStatus {
        let mut trans = Transaction::write(address, data);

        self.dma.b_transport(&mut trans, delay);
        trans.status()
    }

    /// Read `len` bytes of host memory at `address`.
    ///
    /// The data is only meaningful if the returned transaction completed successfully.
    pub fn dma_read(&self, address: u64, len: usize, delay: &mut SimDuration) -> Transaction {
        let mut trans = Transaction::read(address, len);

        self.dma.b_transport(&mut trans, delay);
        trans
    }
}

impl Clocked for ScratchpadBridge {
    fn clock_inputs(&self) -> Vec<ClockInput> {
        vec![ClockInput {
            pin: CLOCK_PIN,
            domain: domain::SLOW,
        }]
    }

    fn clock_edge(&self, _pin: &'static str, rising: bool, _now: SimTime) {
        if rising {
            self.posedges.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ResetSink for ScratchpadBridge {
    fn reset_changed(&self, asserted: bool, _now: SimTime) {
        self.in_reset.store(asserted, Ordering::Relaxed);

        if asserted {
            BridgeModel::reset(self);
        }
    }
}

impl BridgeModel for ScratchpadBridge {
    fn region_target(&self, kind: RegionKind) -> Option<TargetRef> {
        Some(match kind {
            RegionKind::UserBar => self.user.clone(),
            RegionKind::Config => self.config.clone(),
        })
    }

    fn dma_socket(&self) -> &InitiatorSocket<dyn TransactionTarget> {
        &self.dma
    }

    fn reset(&self) {
        debug!("scratchpad bridge reset");

        self.user.clear();
        self.config.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::transaction::testutils::RecordingTarget;

    fn bridge() -> ScratchpadBridge {
        ScratchpadBridge::new(SimDuration::from_ns(20))
    }

    fn access(target: &TargetRef, mut trans: Transaction, delay: &mut SimDuration) -> Transaction {
        target.b_transport(&mut trans, delay);
        trans
    }

    #[test]
    fn bar_memory_is_mirrored_across_the_window() {
        let bridge = bridge();
        let user = bridge.region_target(RegionKind::UserBar).unwrap();
        let mut delay = SimDuration::ZERO;

        let write = access(&user, Transaction::write(0x10, [1, 2, 3, 4]), &mut delay);
        let alias = access(
            &user,
            Transaction::read(0x10 + SCRATCHPAD_SIZE as u64, 4),
            &mut delay,
        );

        assert!(write.is_ok());
        assert_eq!(alias.data(), &[1, 2, 3, 4]);
        assert_eq!(delay, SimDuration::from_ns(40));
    }

    #[test]
    fn accesses_wrap_at_the_end_of_the_ram() {
        let bridge = bridge();
        let config = bridge.region_target(RegionKind::Config).unwrap();
        let mut delay = SimDuration::ZERO;

        access(
            &config,
            Transaction::write(SCRATCHPAD_SIZE as u64 - 2, [0xa, 0xb, 0xc, 0xd]),
            &mut delay,
        );

        assert_eq!(
            access(&config, Transaction::read(0, 2), &mut delay).data(),
            &[0xc, 0xd]
        );
    }

    #[test]
    fn regions_are_backed_by_separate_memories() {
        let bridge = bridge();
        let user = bridge.region_target(RegionKind::UserBar).unwrap();
        let config = bridge.region_target(RegionKind::Config).unwrap();
        let mut delay = SimDuration::ZERO;

        access(&user, Transaction::write(0, [0xff; 4]), &mut delay);

        assert_eq!(
            access(&config, Transaction::read(0, 4), &mut delay).data(),
            &[0; 4]
        );
    }

    #[test]
    fn reset_clears_the_memories() {
        let bridge = bridge();
        let user = bridge.region_target(RegionKind::UserBar).unwrap();
        let mut delay = SimDuration::ZERO;

        access(&user, Transaction::write(0x40, [0x55; 8]), &mut delay);

        bridge.reset_changed(true, SimTime::ZERO);
        assert!(bridge.in_reset());

        bridge.reset_changed(false, SimTime::from_ps(1_000_000));
        assert!(!bridge.in_reset());

        assert_eq!(
            access(&user, Transaction::read(0x40, 8), &mut delay).data(),
            &[0; 8]
        );
    }

    #[test]
    fn only_rising_edges_are_counted() {
        let bridge = bridge();

        bridge.clock_edge(CLOCK_PIN, true, SimTime::ZERO);
        bridge.clock_edge(CLOCK_PIN, false, SimTime::from_ps(10_000));
        bridge.clock_edge(CLOCK_PIN, true, SimTime::from_ps(20_000));

        assert_eq!(bridge.posedges(), 2);
        assert_eq!(
            bridge.clock_inputs(),
            vec![ClockInput {
                pin: CLOCK_PIN,
                domain: domain::SLOW
            }]
        );
    }

    #[test]
    fn dma_goes_out_through_the_socket() {
        let bridge = bridge();
        let upstream = Arc::new(RecordingTarget::new(0x77));
        bridge.dma_socket().bind(upstream.clone()).unwrap();
        let mut delay = SimDuration::ZERO;

        assert_eq!(
            bridge.dma_write(0x1000, &[1, 2], &mut delay),
            ResponseStatus::Ok
        );

        let read = bridge.dma_read(0x2000, 3, &mut delay);
        assert!(read.is_ok());
        assert_eq!(read.data(), &[0x77; 3]);

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].address(), 0x1000);
        assert_eq!(seen[0].data(), &[1, 2]);
        assert_eq!(seen[1].command(), Command::Read);
    }

    #[test]
    fn dma_without_upstream_fails() {
        let bridge = bridge();

        assert_eq!(
            bridge.dma_write(0, &[0], &mut SimDuration::ZERO),
            ResponseStatus::GenericError
        );
    }
}
