//! Session lifecycle events.
//!
//! The session token manager publishes these on its broadcast bus; the billing
//! ledger (and anything else interested in provider cost) subscribes.

use serde::Serialize;

use super::SessionId;
use crate::services::session_tokens::{BundledRequest, ExpiredSession};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    Created { session_id: SessionId },

    /// A details lookup closed the session; the autocomplete calls are billed
    /// as part of the bundle.
    Completed(BundledRequest),

    /// The session timed out without a details lookup; every autocomplete
    /// call is billed individually.
    Expired(ExpiredSession),
}

impl SessionEvent {
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::Created { session_id } => *session_id,
            Self::Completed(bundle) => bundle.session_id,
            Self::Expired(record) => record.session_id,
        }
    }
}
