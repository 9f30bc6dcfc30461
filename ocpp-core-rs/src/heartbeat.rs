//! Idle keepalive and session acceptance
//!
//! A Heartbeat is only injected once the central system accepted our
//! BootNotification, and only when nothing at all was sent for the configured
//! interval.

use serde::Deserialize;
use tracing::info;

use crate::transport::Timestamp;
use crate::types::RegistrationStatus;

/// Fields of BootNotification.conf the engine acts on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationConf {
    pub status: RegistrationStatus,
    #[serde(default)]
    pub interval: i32,
    #[serde(default)]
    pub current_time: Option<String>,
}

impl BootNotificationConf {
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    last_activity: Timestamp,
    accepted: bool,
}

impl HeartbeatMonitor {
    pub fn new(now: Timestamp) -> Self {
        Self {
            last_activity: now,
            accepted: false,
        }
    }

    /// Any successful send counts as activity
    pub fn record_activity(&mut self, now: Timestamp) {
        self.last_activity = now;
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn accept(&mut self) {
        if !self.accepted {
            info!("Session accepted by central system");
        }
        self.accepted = true;
    }

    pub fn reset(&mut self) {
        self.accepted = false;
    }

    /// Whether a keepalive is owed at `now` for the given interval
    pub fn is_due(&self, now: Timestamp, interval_secs: i32) -> bool {
        if !self.accepted || interval_secs <= 0 {
            return false;
        }
        now.saturating_sub(self.last_activity) >= interval_secs as u64
    }
}
