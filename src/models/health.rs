//! Point-in-time view of the service health signals.

use chrono::{DateTime, Utc};

/// Copy of the health flags and activity timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    /// Whether the access plane connection is believed usable.
    pub connected: bool,
    /// Whether the last identity load succeeded.
    pub identity_valid: bool,
    /// When the identity was last loaded and connected successfully.
    pub last_refresh: Option<DateTime<Utc>>,
    /// When a pending request was last picked up for evaluation.
    pub last_request_seen: Option<DateTime<Utc>>,
    /// Set once the request watcher has stopped on an error. Never cleared.
    pub watcher_stopped: bool,
}

impl HealthSnapshot {
    /// Healthy means connected with a valid identity and a live watcher.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connected && self.identity_valid && !self.watcher_stopped
    }
}
