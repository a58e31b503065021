//! # Error Taxonomy
//!
//! ## Purpose
//!
//! This file defines the error types surfaced by the crate. Validation errors
//! leave device state unchanged, transmit-path exhaustion is a transient
//! condition the caller retries, and hardware failures during start/stop abort
//! the remaining sequence and propagate upward.
//!
//! ## Main components
//!
//! - `HwError`: failure reported by the hardware abstraction layer.
//! - `NicError`: controller-level errors (configuration, readiness, allocation).
//! - `TxError`: fast-path transmit outcomes; `Busy` hands the packet back to
//!   the caller so it can be retried without a copy.

use crate::packet::Packet;
use thiserror::Error;

/// An error returned by a hardware-operations implementation.
///
/// The inner name identifies the failing operation; the register-level cause
/// stays behind the hardware boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("hardware operation failed: {op}")]
pub struct HwError {
    pub op: &'static str,
}

impl HwError {
    pub fn new(op: &'static str) -> Self {
        HwError { op }
    }
}

/// Controller-level errors.
#[derive(Debug, Error)]
pub enum NicError {
    /// A requested value lies outside the negotiated hardware capability.
    /// The stored configuration is left unchanged.
    #[error("configuration rejected: {0}")]
    ConfigInvalid(&'static str),

    /// Descriptor or ring resources are exhausted.
    #[error("descriptor resources exhausted")]
    Exhausted,

    /// The device is not initialized or is shutting down.
    #[error("device not ready")]
    NotReady,

    /// The hardware abstraction layer reported a failure.
    #[error(transparent)]
    Hw(#[from] HwError),

    /// Ring or vector construction failed during bring-up.
    #[error("resource allocation failed: {0}")]
    Alloc(&'static str),
}

/// Transmit fast-path outcomes.
///
/// `Busy` is ordinary backpressure, not a fault: the packet is returned to the
/// caller layer, which requeues it once the ring drains.
#[derive(Debug, Error)]
pub enum TxError {
    /// The ring is congested or the lock-retry budget was exhausted.
    /// The untouched packet is handed back for a later retry.
    #[error("transmit path busy")]
    Busy(Packet),

    /// The packet would need more descriptors than the per-transmit budget
    /// allows. The packet is released; nothing was enqueued.
    #[error("packet exceeds the per-transmit descriptor budget")]
    TooFragmented,

    /// The hardware abstraction rejected the submission. The enqueue was
    /// rolled back and the packet released; the ring is unchanged.
    #[error(transparent)]
    Hw(#[from] HwError),
}
