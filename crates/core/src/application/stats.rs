// Broker Statistics
// Lock-free counters shared by the producer side and every consumer

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters
#[derive(Debug, Default)]
pub struct BrokerStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    unhandled: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    consumers_lost: AtomicU64,
}

/// Point-in-time copy of [`BrokerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub rejected: u64,
    /// Dispatches that ran at least one handler successfully
    pub dispatched: u64,
    pub unhandled: u64,
    pub failed: u64,
    pub panicked: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    pub consumers_lost: u64,
}

impl StatsSnapshot {
    /// Messages whose dispatch has finished, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.dispatched + self.unhandled + self.failed + self.panicked
    }
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatch_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn dispatch_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unhandled(&self) {
        self.unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumer_lost(&self) {
        self.consumers_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            consumers_lost: self.consumers_lost.load(Ordering::Relaxed),
        }
    }
}
