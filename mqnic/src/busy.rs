//! # Quiescence Gate
//!
//! ## Purpose
//!
//! This file implements the readiness gate wrapped around every
//! hardware-touching operation (transmit, monitor tick). Unlike a plain busy
//! counter, the gate gives shutdown a real barrier: close admission, then wait
//! for the in-flight count to reach zero before destructive teardown.
//!
//! ## How it works
//!
//! `enter` checks the open flag, bumps the in-flight count, and re-checks the
//! flag to close the race with a concurrent `close`. The returned RAII token
//! decrements on drop. `drain` polls the count from the shutdown path; it is
//! only ever awaited after `close`, so the count can only fall.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct BusyGate {
    open: AtomicBool,
    inflight: AtomicU32,
}

/// RAII in-flight token; dropping it retires the operation.
pub struct BusyToken<'a>(&'a BusyGate);

impl Drop for BusyToken<'_> {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BusyGate {
    pub fn new() -> Self {
        BusyGate {
            open: AtomicBool::new(true),
            inflight: AtomicU32::new(0),
        }
    }

    /// Admits one operation, or refuses if the gate is closed.
    pub fn enter(&self) -> Option<BusyToken<'_>> {
        if !self.open.load(Ordering::Acquire) {
            return None;
        }
        self.inflight.fetch_add(1, Ordering::AcqRel);
        if !self.open.load(Ordering::Acquire) {
            // Lost the race with close(); back out.
            self.inflight.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(BusyToken(self))
    }

    /// Stops admitting new operations. In-flight ones finish normally.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn reopen(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn in_flight(&self) -> u32 {
        self.inflight.load(Ordering::Acquire)
    }

    /// Waits for all admitted operations to retire. Call after `close`.
    pub async fn drain(&self) {
        while self.in_flight() != 0 {
            tokio::time::sleep(Duration::from_micros(50)).await;
        }
    }
}

impl Default for BusyGate {
    fn default() -> Self {
        Self::new()
    }
}
