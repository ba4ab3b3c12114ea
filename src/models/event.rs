//! Watch events delivered by an access plane subscription.

use serde::{Deserialize, Serialize};

use super::request::AccessRequest;

/// Resource kinds that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Access requests.
    AccessRequest,
}

impl ResourceKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessRequest => "access_request",
        }
    }
}

/// Operation carried by a watch event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// Subscription established; no resource payload of interest.
    Init,
    /// Resource created or updated.
    Put,
    /// Resource removed.
    Delete,
}

/// Resource payload of a watch event, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// An access request snapshot.
    AccessRequest(AccessRequest),
    /// Any other resource kind.
    #[serde(other)]
    Other,
}

impl Resource {
    /// Short kind label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessRequest(_) => ResourceKind::AccessRequest.as_str(),
            Self::Other => "other",
        }
    }
}

/// A single change notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub op: OpType,
    /// What it happened to.
    #[serde(default = "other_resource")]
    pub resource: Resource,
}

fn other_resource() -> Resource {
    Resource::Other
}

impl WatchEvent {
    /// Build a `Put` event for an access request.
    #[must_use]
    pub fn put(request: AccessRequest) -> Self {
        Self {
            op: OpType::Put,
            resource: Resource::AccessRequest(request),
        }
    }
}
