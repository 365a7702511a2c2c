//! Broker configuration

use std::time::Duration;

/// Default per-participant mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default intake bus capacity
pub const DEFAULT_INTAKE_CAPACITY: usize = 1024;

/// Poll timeout used when the caller passes a non-positive one
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(25_000);

/// Batch size used when the caller passes a non-positive one
pub const DEFAULT_MAX_BATCH: usize = 32;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Messages a mailbox holds before further deliveries are dropped
    pub mailbox_capacity: usize,

    /// Messages the intake bus holds before publishers wait
    pub intake_capacity: usize,

    /// Poll timeout substituted for non-positive values
    pub default_poll_timeout: Duration,

    /// Batch size substituted for non-positive values
    pub default_max_batch: usize,

    /// Remove participants idle for longer than this (None = never)
    pub idle_timeout: Option<Duration>,

    /// How often the reaper scans for idle participants
    pub reap_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            default_poll_timeout: DEFAULT_POLL_TIMEOUT,
            default_max_batch: DEFAULT_MAX_BATCH,
            idle_timeout: Some(Duration::from_secs(300)),
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl BrokerConfig {
    /// Set mailbox capacity (minimum 1)
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set intake bus capacity (minimum 1)
    pub fn intake_capacity(mut self, capacity: usize) -> Self {
        self.intake_capacity = capacity.max(1);
        self
    }

    /// Set the poll timeout used for non-positive requests
    pub fn default_poll_timeout(mut self, timeout: Duration) -> Self {
        self.default_poll_timeout = timeout;
        self
    }

    /// Set the batch size used for non-positive requests (minimum 1)
    pub fn default_max_batch(mut self, max: usize) -> Self {
        self.default_max_batch = max.max(1);
        self
    }

    /// Set the idle timeout after which participants are reaped
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Never reap idle participants
    pub fn disable_reaper(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Set the reaper scan interval
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}
