//! The pause gate
//!
//! A single shared flag plus an in-flight count coordinate the enrich
//! stage (many readers) with the asset manager (one writer). The hot path
//! is two atomic operations per record; the `Notify` is only touched when
//! a swap is actually in progress.
//!
//! Protocol during a registry swap:
//!
//! 1. manager calls [`PauseGate::pause`] - new records stop entering
//! 2. manager awaits [`PauseGate::drain`] - in-flight enrich calls finish
//! 3. manager swaps the registry and calls [`PauseGate::resume`]
//!
//! `enter` increments the in-flight count *before* checking the flag and
//! backs out if paused, so `drain` observing zero means no enrich call
//! holds a pre-swap registry snapshot.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    in_flight: AtomicUsize,
    notify: Notify,
}

impl PauseGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enter the gate for one record. Suspends while the gate is paused;
    /// the returned guard marks the record in flight until dropped.
    pub async fn enter(self: &Arc<Self>) -> InFlightGuard {
        loop {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            if !self.paused.load(Ordering::Acquire) {
                return InFlightGuard {
                    gate: Arc::clone(self),
                };
            }

            // A swap is in progress: back out and wake the drainer in
            // case we were the count it was waiting on.
            if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.notify.notify_waiters();
            }

            let unpaused = self.notify.notified();
            if self.paused.load(Ordering::Acquire) {
                unpaused.await;
            }
        }
    }

    /// Assert the pause flag. New `enter` calls suspend; in-flight ones
    /// are unaffected.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Wait until no record is in flight. Only meaningful while paused.
    pub async fn drain(&self) {
        loop {
            let drained = self.notify.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Clear the pause flag and wake suspended `enter` calls.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// RAII marker for one in-flight record.
#[derive(Debug)]
pub struct InFlightGuard {
    gate: Arc<PauseGate>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gate.notify.notify_waiters();
        }
    }
}
