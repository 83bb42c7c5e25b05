mod inbound;
mod outbound;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use inbound::{DecodeError, EventKind, ServerEvent, TaskStatus};
pub use outbound::{cancel_body, submit_frame, submit_message};

/// Correlates a request with its stream events and its cancel call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Client-minted id used until the server announces its own task id.
    pub fn provisional() -> Self {
        Self(format!("local-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
