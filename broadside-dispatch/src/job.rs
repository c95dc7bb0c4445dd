//! Units of dispatch work and their results

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{address::EmailAddress, transport::TransportError};

/// Fully personalised content for one recipient. No templating happens past
/// this point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// One recipient's send request.
#[derive(Debug, Clone)]
pub struct Job {
    pub recipient: EmailAddress,
    pub payload: Payload,
    /// Stamped again by [`DispatchQueue::submit`](crate::DispatchQueue::submit)
    pub submitted_at: Instant,
}

impl Job {
    #[must_use]
    pub fn new(recipient: EmailAddress, payload: Payload) -> Self {
        Self {
            recipient,
            payload,
            submitted_at: Instant::now(),
        }
    }
}

/// Why a single send did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFailure {
    pub message: String,
    /// Whether a later attempt could plausibly succeed
    pub temporary: bool,
}

impl SendFailure {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            temporary: false,
        }
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            temporary: true,
        }
    }
}

impl From<&TransportError> for SendFailure {
    fn from(error: &TransportError) -> Self {
        Self {
            message: error.to_string(),
            temporary: error.is_temporary(),
        }
    }
}

/// The outcome of one job. `error` is present iff the send failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub recipient: EmailAddress,
    pub error: Option<SendFailure>,
}

impl DispatchResult {
    #[must_use]
    pub const fn sent(recipient: EmailAddress) -> Self {
        Self {
            recipient,
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(recipient: EmailAddress, failure: SendFailure) -> Self {
        Self {
            recipient,
            error: Some(failure),
        }
    }

    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|failure| failure.message.as_str())
    }

    /// A failure another pass may fix.
    pub fn is_temporary_failure(&self) -> bool {
        self.error.as_ref().is_some_and(|failure| failure.temporary)
    }
}
