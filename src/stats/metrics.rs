//! Statistics and metrics for the broker

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Broker-wide counters
///
/// Updated with relaxed atomics from any task; read through [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct BrokerStats {
    started_at: Instant,
    joins: AtomicU64,
    leaves: AtomicU64,
    reaped: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`BrokerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful joins
    pub joins: u64,
    /// Successful leaves (including connection cleanup)
    pub leaves: u64,
    /// Participants removed for inactivity
    pub reaped: u64,
    /// Messages accepted onto the intake bus
    pub published: u64,
    /// Mailbox deliveries
    pub delivered: u64,
    /// Deliveries dropped because a mailbox was full or closed
    pub dropped: u64,
    /// Time since the broker started
    pub uptime: Duration,
}

impl BrokerStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            joins: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
            reaped: AtomicU64::new(0),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leave(&self) {
        self.leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped(&self, count: u64) {
        self.reaped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one fan-out
    pub fn record_fan_out(&self, delivered: u64, dropped: u64) {
        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            joins: self.joins.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Fraction of attempted deliveries that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let attempted = self.delivered + self.dropped;
        if attempted > 0 {
            self.dropped as f64 / attempted as f64
        } else {
            0.0
        }
    }
}
