//! # Periodic Task Plumbing
//!
//! ## Purpose
//!
//! This file provides the self-rescheduling periodic task behind the service
//! (monitor) timer and the polling-mode dispatch timer. Each tick runs a short,
//! non-blocking body and the next tick is scheduled regardless of the body's
//! outcome; the only cancellation is a synchronous disarm-and-join during stop.
//!
//! ## Main components
//!
//! - `PeriodicTask::spawn`: arms the timer on the current tokio runtime.
//! - `PeriodicTask::disarm`: cancels and joins; after it returns, the body is
//!   guaranteed not to run again.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Arms a periodic task; the first tick fires one full period from now.
    pub fn spawn<F>(period: Duration, mut body: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => body(),
                }
            }
        });
        PeriodicTask { cancel, handle }
    }

    /// Disarms the timer and waits for the task to finish its current tick.
    pub async fn disarm(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }

    /// Requests cancellation without waiting; the task exits at its next
    /// scheduling point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
