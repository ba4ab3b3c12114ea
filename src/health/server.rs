//! HTTP health endpoint.
//!
//! Serves a JSON health document on the configured path. `GET` returns
//! `200 OK` when the access plane is connected, the identity is valid and
//! the request watcher has not stopped, `503 Service Unavailable` otherwise. Any other method gets `405`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::HealthState;
use crate::{AppError, Result};

/// JSON body of the health endpoint.
#[derive(Debug, Serialize)]
struct HealthDocument {
    status: &'static str,
    teleport_connected: bool,
    identity_valid: bool,
    watcher_running: bool,
    last_request_processed: Option<DateTime<Utc>>,
    last_identity_refresh: Option<DateTime<Utc>>,
    uptime: String,
}

/// Build the router serving `path`.
#[must_use]
pub fn router(state: Arc<HealthState>, path: &str) -> Router {
    Router::new().route(path, any(health)).with_state(state)
}

/// Bind `bind` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Health` if the listener cannot be bound or the server
/// fails.
pub async fn serve_health(
    state: Arc<HealthState>,
    bind: SocketAddr,
    path: &str,
    ct: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Health(format!("failed to bind health on {bind}: {err}")))?;
    serve_on(listener, state, path, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Health` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<HealthState>,
    path: &str,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Health(format!("health listener has no address: {err}")))?;
    info!(%local, path, "health endpoint listening");

    axum::serve(listener, router(state, path))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Health(format!("health server error: {err}")))?;

    info!("health endpoint shut down");
    Ok(())
}

async fn health(method: Method, State(state): State<Arc<HealthState>>) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    let snapshot = state.snapshot();
    let healthy = snapshot.is_healthy();
    let document = HealthDocument {
        status: if healthy { "healthy" } else { "unhealthy" },
        teleport_connected: snapshot.connected,
        identity_valid: snapshot.identity_valid,
        watcher_running: !snapshot.watcher_stopped,
        last_request_processed: snapshot.last_request_seen,
        last_identity_refresh: snapshot.last_refresh,
        uptime: format_uptime(state.uptime()),
    };

    match serde_json::to_vec(&document) {
        Ok(body) => {
            let status = if healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(err) => {
            error!(%err, "failed to encode health status");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Compact duration such as `2h5m7s`; leading zero units are omitted.
fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
