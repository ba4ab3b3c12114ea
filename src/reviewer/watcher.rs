//! Access request watcher.
//!
//! Subscribes to access request changes on the current connection, replays
//! the requests that were already pending, then evaluates every newly
//! observed pending request and denies the ones a rule triggers on.
//!
//! The loop only wakes for three things: a watch event, a credential
//! update from the [`CredentialManager`], or cancellation. When the
//! credential manager swaps the connection, the watcher subscribes on the
//! new connection before letting go of the old stream, then catches up on
//! pending requests it could have missed in between.
//!
//! A lost subscription is not retried here. The error is returned to the
//! caller, connectivity is marked unhealthy and the watcher is recorded as
//! stopped, which no later credential refresh clears.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::health::HealthState;
use crate::identity::manager::{ConnectionContext, CredentialManager};
use crate::models::event::{OpType, Resource, ResourceKind, WatchEvent};
use crate::models::request::AccessRequest;
use crate::models::rule::CompiledRule;
use crate::plane::{EventStream, StateUpdate};
use crate::policy::evaluator::PolicyEvaluator;
use crate::{AppError, Result};

/// Watches access requests and denies those that violate policy.
pub struct RequestWatcher {
    evaluator: Arc<PolicyEvaluator>,
    connections: Arc<CredentialManager>,
    health: Arc<HealthState>,
    default_message: String,
    reviewer: Option<String>,
}

impl RequestWatcher {
    /// Build a watcher.
    ///
    /// `default_message` is sent when a triggering rule has no message of
    /// its own; `reviewer` is reported with every deny transition.
    #[must_use]
    pub fn new(
        evaluator: Arc<PolicyEvaluator>,
        connections: Arc<CredentialManager>,
        health: Arc<HealthState>,
        default_message: impl Into<String>,
        reviewer: Option<String>,
    ) -> Self {
        Self {
            evaluator,
            connections,
            health,
            default_message: default_message.into(),
            reviewer,
        }
    }

    /// Run until `ct` is cancelled or the subscription is lost.
    ///
    /// Any error leaves the health state permanently unhealthy.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the subscription cannot be opened
    /// or the event stream ends without cancellation.
    pub async fn run(&self, ct: CancellationToken) -> Result<()> {
        let outcome = self.watch(ct).await;
        if outcome.is_err() {
            self.health.mark_watcher_stopped();
        }
        outcome
    }

    async fn watch(&self, ct: CancellationToken) -> Result<()> {
        let mut updates = self.connections.updates();
        let context = Arc::clone(&*updates.borrow_and_update());

        let mut events = self.subscribe(&context).await?;
        info!(generation = context.generation(), "watching access requests");

        info!("checking for existing pending access requests");
        let mut evaluated = HashSet::new();
        let mut replayed = self.replay_pending(&context, &mut evaluated).await;

        loop {
            tokio::select! {
                biased;
                () = ct.cancelled() => {
                    info!("request watcher shutting down");
                    return Ok(());
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        self.health.mark_disconnected();
                        return Err(AppError::Connection("credential updates closed".into()));
                    }
                    let next = Arc::clone(&*updates.borrow_and_update());
                    (events, replayed) = self.hand_off(&next, &mut evaluated).await?;
                }
                item = events.next() => {
                    let failure = match item {
                        Some(Ok(event)) => {
                            self.handle_event(event, &mut replayed, &mut evaluated).await;
                            continue;
                        }
                        Some(Err(err)) => err,
                        None => AppError::Connection("watch stream ended".into()),
                    };

                    // The swap closes the old connection before this loop
                    // sees the update; that is a handoff, not a failure.
                    if updates.has_changed().unwrap_or(false) {
                        debug!(%failure, "old watch stream ended by connection swap");
                        let next = Arc::clone(&*updates.borrow_and_update());
                        (events, replayed) = self.hand_off(&next, &mut evaluated).await?;
                        continue;
                    }

                    self.health.mark_disconnected();
                    error!(%failure, "access request watch lost");
                    return Err(failure);
                }
            }
        }
    }

    async fn subscribe(&self, context: &ConnectionContext) -> Result<EventStream> {
        context
            .plane()
            .subscribe(ResourceKind::AccessRequest)
            .await
            .inspect_err(|err| {
                self.health.mark_disconnected();
                error!(%err, generation = context.generation(), "failed to subscribe to access requests");
            })
    }

    /// Move the subscription to `next` and catch up on requests that may
    /// have arrived while no stream was open.
    async fn hand_off(
        &self,
        next: &ConnectionContext,
        evaluated: &mut HashSet<String>,
    ) -> Result<(EventStream, HashSet<String>)> {
        let events = self.subscribe(next).await?;
        info!(
            generation = next.generation(),
            "moved watch to refreshed connection"
        );
        let replayed = self.replay_pending(next, evaluated).await;
        Ok((events, replayed))
    }

    /// Evaluate every currently pending request that has not been evaluated
    /// before.
    ///
    /// `evaluated` carries the IDs already decided on earlier connections;
    /// they are not decided again, and entries no longer pending are
    /// dropped. Returns the IDs denied here so that a stale pending echo of
    /// the same request on the live stream is not denied a second time.
    async fn replay_pending(
        &self,
        context: &ConnectionContext,
        evaluated: &mut HashSet<String>,
    ) -> HashSet<String> {
        let mut denied = HashSet::new();
        let requests = match context.plane().list_pending().await {
            Ok(requests) => requests,
            Err(err) => {
                error!(%err, "error processing existing requests");
                return denied;
            }
        };

        info!(count = requests.len(), "found existing pending requests");
        let pending: Vec<&AccessRequest> = requests.iter().filter(|r| r.is_pending()).collect();
        evaluated.retain(|id| pending.iter().any(|r| r.id == *id));

        for request in pending {
            if !evaluated.insert(request.id.clone()) {
                debug!(request_id = %request.id, "request already evaluated, skipping");
                continue;
            }
            debug!(request_id = %request.id, reason = %request.reason, "processing existing request");
            if self.process(request).await {
                denied.insert(request.id.clone());
            }
        }
        denied
    }

    async fn handle_event(
        &self,
        event: WatchEvent,
        replayed: &mut HashSet<String>,
        evaluated: &mut HashSet<String>,
    ) {
        if event.op != OpType::Put {
            debug!(op = ?event.op, kind = event.resource.kind(), "ignoring event type");
            return;
        }

        let request = match event.resource {
            Resource::AccessRequest(request) => request,
            other => {
                debug!(kind = other.kind(), "event resource is not an access request");
                return;
            }
        };

        let echo = replayed.remove(&request.id);
        if !request.is_pending() {
            debug!(request_id = %request.id, state = %request.state, "request is not pending, ignoring");
            return;
        }
        if echo {
            debug!(request_id = %request.id, "request already denied during replay, ignoring");
            return;
        }

        debug!(request_id = %request.id, reason = %request.reason, "processing access request");
        self.process(&request).await;
        evaluated.insert(request.id);
    }

    /// Evaluate one pending request and deny it if a rule triggers.
    /// Returns whether the request was denied.
    async fn process(&self, request: &AccessRequest) -> bool {
        self.health.record_request_seen();

        let Some(rule) = self.evaluator.decide(request) else {
            info!(
                request_id = %request.id,
                user = %request.user,
                "request does not match any rejection rules, leaving for review"
            );
            return false;
        };

        match self.deny(request, rule).await {
            Ok(()) => {
                info!(
                    request_id = %request.id,
                    user = %request.user,
                    rule = %rule.name,
                    denial = rule.message_or(&self.default_message),
                    "rejected access request"
                );
                true
            }
            Err(err) => {
                warn!(
                    request_id = %request.id,
                    rule = %rule.name,
                    %err,
                    "failed to reject access request"
                );
                false
            }
        }
    }

    async fn deny(&self, request: &AccessRequest, rule: &CompiledRule) -> Result<()> {
        let update = StateUpdate::deny(
            request.id.as_str(),
            rule.message_or(&self.default_message),
            self.reviewer.clone(),
        );
        let context = self.connections.current();
        context.plane().set_state(update).await
    }
}

/// Spawn `watcher` as a background task.
///
/// The task resolves to the watcher's outcome so the caller can stop the
/// service when the subscription is lost.
#[must_use]
pub fn spawn_watcher(
    watcher: Arc<RequestWatcher>,
    ct: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(
        async move {
            watcher
                .run(ct)
                .await
                .inspect_err(|err| error!(%err, "access request watcher stopped"))
        }
        .instrument(info_span!("request_watcher")),
    )
}
