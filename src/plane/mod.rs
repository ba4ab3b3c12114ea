//! Access plane abstraction.
//!
//! The [`AccessPlane`] trait is the only surface the reviewer core uses to
//! reach the cluster: subscribe to changes, list pending requests, and set
//! a request's state. A [`Connector`] turns a [`Credential`] into a live
//! connection; the credential manager calls it on every refresh.

pub mod codec;
pub mod http;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;

use crate::identity::credential::Credential;
use crate::models::event::{ResourceKind, WatchEvent};
use crate::models::request::{AccessRequest, RequestState};
use crate::Result;

/// Boxed future returned by the plane traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stream of watch events. An `Err` item or the end of the stream means the
/// subscription is gone.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>;

/// A requested state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateUpdate {
    /// Target request.
    #[serde(skip)]
    pub request_id: String,
    /// New state.
    pub state: RequestState,
    /// Justification recorded with the transition.
    pub reason: String,
    /// Reviewer identity reported to the plane, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
}

impl StateUpdate {
    /// A `Pending → Denied` transition.
    #[must_use]
    pub fn deny(
        request_id: impl Into<String>,
        reason: impl Into<String>,
        reviewer: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            state: RequestState::Denied,
            reason: reason.into(),
            reviewer,
        }
    }
}

/// An authenticated connection to the access plane.
pub trait AccessPlane: Send + Sync {
    /// Open a change subscription for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`](crate::AppError::Connection) if the
    /// subscription cannot be established.
    fn subscribe(&self, kind: ResourceKind) -> BoxFuture<'_, Result<EventStream>>;

    /// List all access requests currently in the pending state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`](crate::AppError::Connection) if the
    /// listing fails.
    fn list_pending(&self) -> BoxFuture<'_, Result<Vec<AccessRequest>>>;

    /// Apply a state transition to one request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Request`](crate::AppError::Request) if the plane
    /// rejects or fails the call.
    fn set_state(&self, update: StateUpdate) -> BoxFuture<'_, Result<()>>;

    /// Release the connection. Open subscriptions end; calls made after
    /// this fail. Calls already in flight are allowed to finish.
    fn close(&self);
}

/// Establishes access plane connections from identity material.
pub trait Connector: Send + Sync {
    /// Connect with `credential` and confirm the connection is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`](crate::AppError::Connection) if the
    /// plane is unreachable, or [`AppError::Credential`](crate::AppError::Credential)
    /// if the material is rejected by the TLS stack.
    fn connect<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<Arc<dyn AccessPlane>>>;
}
