//! # Vector Dispatch
//!
//! ## Purpose
//!
//! This file implements the vector: the notification unit (interrupt or poll
//! slot) servicing one transmit ring per traffic class. Its dispatch loop
//! drains completions, releases packet handles and lifts queue backpressure
//! once a stalled ring has drained far enough.
//!
//! ## How it works
//!
//! Dispatch reads the hardware completion head per ring and hands it to the
//! ring's reclaim. A hardware read error is absorbed for that pass; the next
//! notification retries. When a previously stopped ring climbs back to the
//! per-transmit budget, the stack-facing queue is restarted exactly once (the
//! edge is a compare-exchange inside the ring).

use crate::cfg::TX_FRAGS_MAX;
use crate::error::HwError;
use crate::hw::HwOps;
use crate::nic::Netif;
use crate::ring::{TxCounters, TxRing};
use std::sync::Arc;

/// One interrupt/poll vector and the ring(s) it owns.
pub struct Vector {
    idx: u32,
    rings: Vec<Arc<TxRing>>,
}

impl Vector {
    pub fn new(idx: u32, rings: Vec<Arc<TxRing>>) -> Self {
        Vector { idx, rings }
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn rings(&self) -> &[Arc<TxRing>] {
        &self.rings
    }

    /// Programs this vector's rings into hardware.
    pub fn init<H: HwOps>(&self, hw: &H, depth: u32) -> Result<(), HwError> {
        for ring in &self.rings {
            hw.ring_tx_init(ring.idx(), depth)?;
        }
        Ok(())
    }

    pub fn start<H: HwOps>(&self, hw: &H) -> Result<(), HwError> {
        for ring in &self.rings {
            hw.ring_tx_start(ring.idx())?;
        }
        Ok(())
    }

    pub fn stop<H: HwOps>(&self, hw: &H) -> Result<(), HwError> {
        for ring in &self.rings {
            hw.ring_tx_stop(ring.idx())?;
        }
        Ok(())
    }

    /// One dispatch pass: reclaim completions and lift backpressure.
    ///
    /// Runs on hardware notification, or from the polling timer when the
    /// device runs without interrupts. This is the only place a ring's tail
    /// side moves.
    pub fn dispatch<H: HwOps>(&self, hw: &H, netif: &dyn Netif) {
        for ring in &self.rings {
            let hw_head = match hw.ring_tx_head(ring.idx()) {
                Ok(head) => head,
                Err(err) => {
                    log::warn!("vector {}: completion head read failed: {err}", self.idx);
                    continue;
                }
            };
            ring.reclaim(hw_head);
            if ring.resume_if_ready(TX_FRAGS_MAX as u32) {
                netif.queue_start(ring.idx());
            }
        }
    }

    /// Folds this vector's ring statistics into `agg`.
    pub fn add_stats(&self, agg: &mut TxCounters) {
        for ring in &self.rings {
            agg.merge(ring.stats().snapshot());
        }
    }
}
