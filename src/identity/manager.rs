//! Credential manager: owns the live access plane connection and keeps its
//! identity fresh.
//!
//! The current [`ConnectionContext`] (credential plus the connection built
//! from it) lives in a `tokio::sync::watch` slot. Readers clone the `Arc`
//! under the slot's read lock; a refresh replaces it in one write. The same
//! slot is the update mailbox: a subscriber that falls behind only ever
//! sees the newest context.
//!
//! A refresh is make-before-break. The new credential is loaded and a new
//! connection is established first; only when that succeeds is the context
//! swapped and the previous connection closed. Any failure leaves the
//! current context untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::credential::Credential;
use crate::config::MAX_IDENTITY_REFRESH_SECONDS;
use crate::health::HealthState;
use crate::plane::{AccessPlane, Connector};
use crate::Result;

/// A credential and the connection established with it, swapped as one unit.
pub struct ConnectionContext {
    credential: Arc<Credential>,
    plane: Arc<dyn AccessPlane>,
    generation: u64,
    established_at: DateTime<Utc>,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("credential", &self.credential)
            .field("generation", &self.generation)
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}

impl ConnectionContext {
    /// Identity material backing this connection.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The live connection.
    #[must_use]
    pub fn plane(&self) -> &Arc<dyn AccessPlane> {
        &self.plane
    }

    /// Sequence number; the first context is generation 1.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the connection was confirmed live.
    #[must_use]
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

/// Owns the current [`ConnectionContext`] and refreshes it.
pub struct CredentialManager {
    identity_path: PathBuf,
    connector: Arc<dyn Connector>,
    health: Arc<HealthState>,
    current: watch::Sender<Arc<ConnectionContext>>,
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    /// Load the identity at `identity_path`, connect, and publish the first
    /// context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` if the identity cannot be loaded or
    /// `AppError::Connection` if the first connection fails. Both are fatal
    /// at startup.
    pub async fn start(
        identity_path: impl Into<PathBuf>,
        connector: Arc<dyn Connector>,
        health: Arc<HealthState>,
    ) -> Result<Self> {
        let identity_path = identity_path.into();
        let context = establish(&identity_path, connector.as_ref(), 1).await?;
        health.record_refresh();
        info!(
            path = %identity_path.display(),
            fingerprint = context.credential.fingerprint(),
            "identity loaded and connected"
        );

        let (current, _) = watch::channel(Arc::new(context));
        Ok(Self {
            identity_path,
            connector,
            health,
            current,
            refresh_lock: Mutex::new(()),
        })
    }

    /// The context to use right now.
    #[must_use]
    pub fn current(&self) -> Arc<ConnectionContext> {
        Arc::clone(&*self.current.borrow())
    }

    /// Latest-wins notification of context changes.
    ///
    /// The returned receiver starts with the current context marked as seen.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<Arc<ConnectionContext>> {
        self.current.subscribe()
    }

    /// Path the identity is reloaded from.
    #[must_use]
    pub fn identity_path(&self) -> &Path {
        &self.identity_path
    }

    /// Reload the identity, reconnect, and swap the new context in.
    ///
    /// The identity file is reloaded on every call, whether or not its
    /// content changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` if the identity cannot be loaded, or
    /// `AppError::Connection` if connecting with it fails. The current
    /// context stays in place in both cases.
    pub async fn refresh(&self) -> Result<Arc<ConnectionContext>> {
        let _cycle = self.refresh_lock.lock().await;
        let previous = self.current();
        info!(path = %self.identity_path.display(), "refreshing identity");

        let credential = match Credential::load(&self.identity_path).await {
            Ok(credential) => credential,
            Err(err) => {
                self.health.mark_identity_invalid();
                return Err(err);
            }
        };

        if credential.fingerprint() == previous.credential.fingerprint() {
            info!(
                fingerprint = credential.fingerprint(),
                "identity material unchanged, reconnecting anyway"
            );
        }

        let plane = match self.connector.connect(&credential).await {
            Ok(plane) => plane,
            Err(err) => {
                self.health.mark_disconnected();
                self.health.mark_identity_invalid();
                return Err(err);
            }
        };

        let next = Arc::new(ConnectionContext {
            credential: Arc::new(credential),
            plane,
            generation: previous.generation + 1,
            established_at: Utc::now(),
        });

        let replaced = self.current.send_replace(Arc::clone(&next));
        replaced.plane.close();
        self.health.record_refresh();

        info!(
            generation = next.generation,
            fingerprint = next.credential.fingerprint(),
            "identity refreshed and connection swapped"
        );
        Ok(next)
    }
}

async fn establish(
    identity_path: &Path,
    connector: &dyn Connector,
    generation: u64,
) -> Result<ConnectionContext> {
    let credential = Credential::load(identity_path).await?;
    let plane = connector.connect(&credential).await?;
    Ok(ConnectionContext {
        credential: Arc::new(credential),
        plane,
        generation,
        established_at: Utc::now(),
    })
}

/// Spawn the periodic identity refresh task.
///
/// The first refresh happens one `interval` after spawning. The interval is
/// clamped to at most [`MAX_IDENTITY_REFRESH_SECONDS`]. Failures are logged
/// and retried on the next tick; the task only ends on cancellation.
#[must_use]
pub fn spawn_refresh_task(
    manager: Arc<CredentialManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let interval = interval.clamp(
                Duration::from_millis(1),
                Duration::from_secs(MAX_IDENTITY_REFRESH_SECONDS),
            );
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "identity refresh enabled");

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("identity refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = manager.refresh().await {
                            error!(%err, "identity refresh failed, keeping current connection");
                        }
                    }
                }
            }
        }
        .instrument(info_span!("identity_refresh")),
    )
}
