//! Engine tuning
//!
//! Covers the knobs that are not OCPP configuration keys. Values the central
//! system may change at runtime (heartbeat interval, transaction retry policy)
//! live in [`crate::configuration::Configuration`] instead.

use std::time::Duration;

/// Default number of message slots
pub const DEFAULT_POOL_CAPACITY: usize = 8;

/// Default send attempts before an ordinary message is dropped
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default response timeout and retry spacing
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of live messages
    pub capacity: usize,

    /// Send attempts allowed for an ordinary message
    pub retry_limit: u32,

    /// Time to wait for a response, and the spacing between retries after
    /// a failed send
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            retry_limit: DEFAULT_RETRY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Set pool capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set ordinary retry limit
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Set response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}
