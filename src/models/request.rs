//! Access request snapshot as observed on the access plane.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Awaiting review. The only state this service acts on.
    Pending,
    /// Granted by a reviewer.
    Approved,
    /// Rejected by a reviewer or by this service.
    Denied,
    /// Any state this service does not model (e.g. promoted).
    #[serde(other)]
    Unknown,
}

impl RequestState {
    /// Wire name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for RequestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a user's request for elevated roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AccessRequest {
    /// Request identifier assigned by the access plane.
    pub id: String,
    /// User who filed the request.
    #[serde(default)]
    pub user: String,
    /// Roles the user asked for.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Free-text justification supplied by the user.
    #[serde(default)]
    pub reason: String,
    /// Current lifecycle state.
    pub state: RequestState,
}

impl AccessRequest {
    /// Whether the request still awaits review.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }
}
