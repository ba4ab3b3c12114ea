//! HTTP gateway client for the access plane.
//!
//! Speaks JSON over HTTPS with mutual TLS from the identity file:
//!
//! | Operation      | Request                                   |
//! |----------------|-------------------------------------------|
//! | connect check  | `GET  /v1/ping`                           |
//! | list pending   | `GET  /v1/access_requests?state=pending`  |
//! | set state      | `PUT  /v1/access_requests/{id}/state`     |
//! | subscribe      | `GET  /v1/watch?kind=access_request` (NDJSON stream) |

use std::sync::Arc;
use std::time::Duration;

use futures_util::{future, StreamExt, TryStreamExt};
use reqwest::{Certificate, Client, Identity, Url};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{parse_event_line, EventCodec};
use super::{AccessPlane, BoxFuture, Connector, EventStream, StateUpdate};
use crate::identity::credential::Credential;
use crate::models::event::ResourceKind;
use crate::models::request::{AccessRequest, RequestState};
use crate::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds [`HttpPlane`] connections against one gateway address.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: Url,
}

impl HttpConnector {
    /// Create a connector for `addr`.
    ///
    /// A bare `host:port` is reached over `https://`; an explicit
    /// `http://` or `https://` prefix is used as given.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `addr` is not a valid URL.
    pub fn new(addr: &str) -> Result<Self> {
        let raw = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_owned()
        } else {
            format!("https://{addr}")
        };
        let base_url = Url::parse(&raw)
            .map_err(|err| AppError::Config(format!("invalid teleport.addr {addr}: {err}")))?;
        Ok(Self { base_url })
    }

    /// Base URL every request is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Connector for HttpConnector {
    fn connect<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<Arc<dyn AccessPlane>>> {
        Box::pin(async move {
            let plane = HttpPlane {
                client: build_client(credential)?,
                base_url: self.base_url.clone(),
                closed: CancellationToken::new(),
            };
            plane.ping().await?;
            info!(base_url = %self.base_url, fingerprint = credential.fingerprint(), "connected to access plane");
            Ok(Arc::new(plane) as Arc<dyn AccessPlane>)
        })
    }
}

fn build_client(credential: &Credential) -> Result<Client> {
    let identity = Identity::from_pem(credential.identity_pem().as_bytes())
        .map_err(|err| AppError::Credential(format!("identity rejected by tls stack: {err}")))?;

    let mut builder = Client::builder()
        .identity(identity)
        .connect_timeout(CONNECT_TIMEOUT);
    for pem in credential.ca_pems() {
        let ca = Certificate::from_pem(pem.as_bytes())
            .map_err(|err| AppError::Credential(format!("invalid ca certificate: {err}")))?;
        builder = builder.add_root_certificate(ca);
    }

    builder
        .build()
        .map_err(|err| AppError::Connection(format!("failed to build http client: {err}")))
}

/// One authenticated gateway connection.
pub struct HttpPlane {
    client: Client,
    base_url: Url,
    closed: CancellationToken,
}

impl HttpPlane {
    fn url(&self, segments: &[&str], query: Option<(&str, &str)>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Config(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            Err(AppError::Connection("connection closed".into()))
        } else {
            Ok(())
        }
    }

    async fn ping(&self) -> Result<()> {
        let url = self.url(&["v1", "ping"], None)?;
        self.client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::Connection(format!("ping failed: {err}")))?;
        Ok(())
    }

    async fn fetch_pending(&self) -> Result<Vec<AccessRequest>> {
        self.ensure_open()?;
        let url = self.url(
            &["v1", "access_requests"],
            Some(("state", RequestState::Pending.as_str())),
        )?;
        let requests: Vec<AccessRequest> = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::Connection(format!("list pending failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::Connection(format!("malformed pending list: {err}")))?;
        debug!(count = requests.len(), "listed pending requests");
        Ok(requests)
    }

    async fn put_state(&self, update: &StateUpdate) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(AppError::Request(format!(
                "connection closed before {} could be updated",
                update.request_id
            )));
        }
        let url = self.url(
            &["v1", "access_requests", update.request_id.as_str(), "state"],
            None,
        )?;
        self.client
            .put(url)
            .json(update)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| {
                AppError::Request(format!(
                    "set state {} on {} failed: {err}",
                    update.state, update.request_id
                ))
            })?;
        Ok(())
    }

    async fn open_watch(&self, kind: ResourceKind) -> Result<EventStream> {
        self.ensure_open()?;
        let url = self.url(&["v1", "watch"], Some(("kind", kind.as_str())))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::Connection(format!("subscribe failed: {err}")))?;

        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let events = FramedRead::new(body, EventCodec::new())
            .filter_map(|line| {
                future::ready(match line {
                    Ok(line) => match parse_event_line(&line) {
                        Ok(event) => event.map(Ok),
                        Err(err) => {
                            warn!(%err, "skipping malformed watch event");
                            None
                        }
                    },
                    Err(err) => Some(Err(AppError::Connection(format!(
                        "watch stream failed: {err}"
                    )))),
                })
            })
            .take_until(self.closed.clone().cancelled_owned());

        Ok(Box::pin(events))
    }
}

impl AccessPlane for HttpPlane {
    fn subscribe(&self, kind: ResourceKind) -> BoxFuture<'_, Result<EventStream>> {
        Box::pin(self.open_watch(kind))
    }

    fn list_pending(&self) -> BoxFuture<'_, Result<Vec<AccessRequest>>> {
        Box::pin(self.fetch_pending())
    }

    fn set_state(&self, update: StateUpdate) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.put_state(&update).await })
    }

    fn close(&self) {
        debug!(base_url = %self.base_url, "closing access plane connection");
        self.closed.cancel();
    }
}
