//! The outbound mail seam.
//!
//! The dispatch queue only ever talks to a [`Transport`]. Implementations
//! must report failure through the returned `Result` rather than panicking,
//! and must be safe to call concurrently from many in-flight sends.

mod smtp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use smtp::{SmtpConfig, SmtpTls, SmtpTransport};

use crate::{address::EmailAddress, job::Payload};

/// Async email sending trait.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one personalised email to one recipient.
    async fn send(&self, recipient: &EmailAddress, payload: &Payload) -> Result<(), TransportError>;
}

/// Failures reported by a transport.
///
/// The display text is what ends up in campaign error samples, so the
/// variants carry the provider's wording unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The provider refused the message or recipient. Retrying will not help.
    #[error("{0}")]
    Rejected(String),

    /// Connection trouble or a transient provider response.
    #[error("{0}")]
    Unavailable(String),

    /// The send did not finish in time.
    #[error("send timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The message could not be assembled.
    #[error("could not build message: {0}")]
    Build(String),
}

impl TransportError {
    /// Returns `true` if a later attempt could succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
