//! # Transmit Descriptor Ring
//!
//! ## Purpose
//!
//! This file implements the fixed-capacity circular descriptor ring backing one
//! transmit queue, together with its accounting: head/tail counters, the free
//! slot count, cumulative statistics and the stopped/running queue edge used
//! for backpressure signaling.
//!
//! ## How it works
//!
//! Head and tail are free-running wrapping counters; a slot index is the
//! counter masked by `size - 1` (the depth is a power of two). Producers append
//! under the ring mutex after a non-blocking `try_lock`; the consumer side
//! (the owning vector) reclaims completed descriptors in FIFO order up to the
//! completion head reported by hardware. The free-slot count is an atomic so
//! the transmit path can apply backpressure before ever touching the lock.
//!
//! ## Main components
//!
//! - `TxDesc` / `DescFlags`: one hardware-facing transfer unit.
//! - `TxRing`: the ring with its lock, counters and statistics.
//! - `RingStats` / `TxCounters`: cumulative and snapshot statistics.

use crate::packet::Packet;
use bitflags::bitflags;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

bitflags! {
    /// Control flags of one transmit descriptor.
    ///
    /// The checksum-offload bits are mutually exclusive and only ever set on
    /// the start-of-packet descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DescFlags: u16 {
        /// First descriptor of a packet.
        const SOP = 1 << 0;
        /// Last descriptor of a packet.
        const EOP = 1 << 1;
        const IP_CSO = 1 << 2;
        const TCP_CSO = 1 << 3;
        const UDP_CSO = 1 << 4;
        /// The referenced region is DMA-mapped payload.
        const MAPPED = 1 << 5;
        /// Segmentation-offload context descriptor; carries no payload.
        const TXC = 1 << 6;
    }
}

/// One hardware-facing transmit descriptor.
///
/// `len_pkt` is recorded on the first descriptor of a packet only. The
/// `len_l2`/`len_l3`/`len_l4`/`mss` fields are meaningful on context
/// descriptors (`DescFlags::TXC`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDesc {
    pub addr: u64,
    pub len: u32,
    pub len_pkt: u32,
    pub flags: DescFlags,
    pub len_l2: u8,
    pub len_l3: u8,
    pub len_l4: u8,
    pub mss: u16,
}

/// Cumulative per-ring transmit statistics.
#[derive(Debug, Default)]
pub struct RingStats {
    packets: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl RingStats {
    pub fn add_tx(&self, packets: u64, bytes: u64) {
        self.packets.fetch_add(packets, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TxCounters {
        TxCounters {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A statistics snapshot, also used as the aggregation accumulator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxCounters {
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
}

impl TxCounters {
    pub fn merge(&mut self, other: TxCounters) {
        self.packets += other.packets;
        self.bytes += other.bytes;
        self.errors += other.errors;
    }
}

/// What one reclaim pass freed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    pub descriptors: u32,
    pub packets: u32,
    pub bytes: u64,
}

struct Slot {
    desc: TxDesc,
    /// Packet handle parked on the end-of-packet slot, released on reclaim.
    packet: Option<Packet>,
}

/// Head-side ring state, guarded by the ring mutex.
pub struct RingState {
    /// Free-running producer counter; slot index is `head & (size - 1)`.
    head: u32,
    slots: Box<[Slot]>,
}

/// One transmit descriptor ring.
///
/// Producers (transmit callers) append under the mutex; the owning vector is
/// the only consumer and reclaims in FIFO order. `available` is maintained
/// atomically so backpressure decisions never need the lock.
pub struct TxRing {
    idx: u32,
    size: u32,
    state: Mutex<RingState>,
    /// Free-running consumer counter, advanced only by `reclaim`.
    tail: AtomicU32,
    available: AtomicU32,
    /// Queue stopped towards the stack. Rings start stopped; the controller's
    /// start sequence raises them.
    stopped: AtomicBool,
    stats: RingStats,
}

impl TxRing {
    /// Creates a ring of `size` descriptor slots.
    ///
    /// The depth must be a power of two and leave room for at least one
    /// maximal packet.
    pub fn new(idx: u32, size: u32) -> Result<Self, crate::error::NicError> {
        if !size.is_power_of_two() || (size as usize) <= crate::cfg::TX_FRAGS_MAX {
            return Err(crate::error::NicError::Alloc("bad tx ring depth"));
        }
        let slots = (0..size)
            .map(|_| Slot {
                desc: TxDesc::default(),
                packet: None,
            })
            .collect();
        Ok(TxRing {
            idx,
            size,
            state: Mutex::new(RingState { head: 0, slots }),
            tail: AtomicU32::new(0),
            available: AtomicU32::new(size),
            stopped: AtomicBool::new(true),
            stats: RingStats::default(),
        })
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Current free-slot count, readable without the lock.
    pub fn available(&self) -> u32 {
        self.available.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &RingStats {
        &self.stats
    }

    /// Non-blocking lock attempt for the transmit path.
    ///
    /// `None` means another producer, or the reclaiming vector, currently
    /// holds the ring; the caller retries within its attempt budget.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, RingState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Appends one packet's descriptor run.
    ///
    /// The caller holds the ring lock and has verified `available()` covers
    /// the run; the packet handle parks on the final (end-of-packet) slot.
    pub fn enqueue(&self, state: &mut RingState, descs: &[TxDesc], packet: Packet) {
        debug_assert!(descs.len() as u32 <= self.available());
        let mask = self.size - 1;
        for (i, desc) in descs.iter().enumerate() {
            let slot = &mut state.slots[(state.head.wrapping_add(i as u32) & mask) as usize];
            slot.desc = *desc;
            slot.packet = None;
        }
        let last = (state.head.wrapping_add(descs.len() as u32 - 1) & mask) as usize;
        state.slots[last].packet = Some(packet);
        state.head = state.head.wrapping_add(descs.len() as u32);
        self.available.fetch_sub(descs.len() as u32, Ordering::AcqRel);
    }

    /// Undoes the most recent `enqueue` of `n` descriptors after a failed
    /// hardware submission, so no partial enqueue stays visible. The parked
    /// packet handle is dropped (released).
    pub fn rollback(&self, state: &mut RingState, n: usize) {
        let mask = self.size - 1;
        state.head = state.head.wrapping_sub(n as u32);
        for i in 0..n as u32 {
            let slot = &mut state.slots[(state.head.wrapping_add(i) & mask) as usize];
            slot.desc = TxDesc::default();
            slot.packet = None;
        }
        self.available.fetch_add(n as u32, Ordering::AcqRel);
        self.stats.add_error();
    }

    /// Consumer-side reclaim up to the hardware completion head.
    ///
    /// Called only from the owning vector's dispatch path. Advances the tail
    /// in FIFO order, releases parked packet handles and restores the
    /// free-slot count.
    pub fn reclaim(&self, hw_head: u32) -> Reclaimed {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mask = self.size - 1;
        let mut tail = self.tail.load(Ordering::Acquire);
        let mut out = Reclaimed::default();
        while tail != hw_head && tail != state.head {
            let slot = &mut state.slots[(tail & mask) as usize];
            if let Some(packet) = slot.packet.take() {
                out.packets += 1;
                out.bytes += u64::from(packet.total_len());
            }
            slot.desc = TxDesc::default();
            tail = tail.wrapping_add(1);
            out.descriptors += 1;
        }
        self.tail.store(tail, Ordering::Release);
        self.available.fetch_add(out.descriptors, Ordering::AcqRel);
        out
    }

    /// Marks the queue stopped. Returns true on the stop edge, false if it was
    /// already stopped (no duplicate signal).
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    /// Marks the queue running. Returns true on the start edge.
    pub fn start(&self) -> bool {
        self.stopped.swap(false, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Restarts a stopped queue once availability is back above `threshold`.
    /// The compare-exchange guarantees exactly one start edge per stall.
    pub fn resume_if_ready(&self, threshold: u32) -> bool {
        self.available() >= threshold
            && self
                .stopped
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}
