//! Health signals shared between the background loops and the endpoint.
//!
//! [`HealthState`] is the only owner of the connectivity and identity flags
//! and the activity timestamps. Writers (credential refresh, request
//! watcher) and the reader (health endpoint) go through its narrow
//! accessors; no caller ever touches the lock directly.

pub mod server;

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::health::HealthSnapshot;

/// Shared, lock-guarded health flags.
#[derive(Debug)]
pub struct HealthState {
    inner: RwLock<HealthSnapshot>,
    started: Instant,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Start with everything unhealthy and no activity recorded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HealthSnapshot::default()),
            started: Instant::now(),
        }
    }

    /// A successful identity load and connection: both flags go healthy and
    /// the refresh timestamp advances. A stopped watcher stays stopped.
    pub fn record_refresh(&self) {
        self.update(|s| {
            s.connected = true;
            s.identity_valid = true;
            s.last_refresh = Some(Utc::now());
        });
    }

    /// The access plane connection is lost or could not be established.
    pub fn mark_disconnected(&self) {
        self.update(|s| s.connected = false);
    }

    /// The identity material could not be loaded or was rejected.
    pub fn mark_identity_invalid(&self) {
        self.update(|s| s.identity_valid = false);
    }

    /// The request watcher ended on an error. Sticky: nothing resets it, so
    /// the service reports unhealthy until it is restarted.
    pub fn mark_watcher_stopped(&self) {
        self.update(|s| {
            s.watcher_stopped = true;
            s.connected = false;
        });
    }

    /// A pending request was picked up for evaluation.
    pub fn record_request_seen(&self) {
        self.update(|s| s.last_request_seen = Some(Utc::now()));
    }

    /// Copy of the current flags.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since this state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn update(&self, apply: impl FnOnce(&mut HealthSnapshot)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }
}
