//! Error types for campaign dispatch.
//!
//! Per-recipient send failures never appear here; they travel as
//! [`SendFailure`](crate::SendFailure) inside a result. The types below cover
//! the structural failures: bad configuration, bad input rejected before any
//! job is queued, and broken queue accounting.

use thiserror::Error;

/// Errors raised by the dispatch queue itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A configuration value cannot drive a queue.
    #[error("Invalid dispatch configuration for {field}: {reason}")]
    Configuration { field: &'static str, reason: String },

    /// Slot or result accounting went wrong. Fatal to the drain.
    #[error("Dispatch invariant violated: {0}")]
    Invariant(String),

    /// The scheduler task is no longer running.
    #[error("Dispatch scheduler stopped before the queue drained")]
    SchedulerGone,
}

/// Rejection reasons for a recipient address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Malformed address {input:?}: {reason}")]
    Malformed { input: String, reason: String },

    #[error("Expected a single address, found several in {0:?}")]
    Multiple(String),

    #[error("Group syntax is not a deliverable address: {0:?}")]
    Group(String),
}

/// Problems found while checking a template before personalisation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("placeholder opened at byte {offset} is never closed")]
    Unclosed { offset: usize },
}

/// Errors surfaced to the caller of a campaign send.
///
/// Everything except [`CampaignError::Dispatch`] is an input problem detected
/// before the first job is submitted.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Subject and HTML content required")]
    MissingContent,

    #[error("Malformed template in {field}: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("No valid recipients found")]
    NoRecipients,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl CampaignError {
    /// Returns `true` if the campaign was rejected because of its input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::Dispatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_error_classification() {
        assert!(CampaignError::MissingContent.is_validation());
        assert!(CampaignError::NoRecipients.is_validation());
        assert!(
            CampaignError::Template {
                field: "subject",
                source: TemplateError::Unclosed { offset: 3 },
            }
            .is_validation()
        );
        assert!(!CampaignError::Dispatch(DispatchError::SchedulerGone).is_validation());
    }

    #[test]
    fn test_error_display() {
        let error = CampaignError::Template {
            field: "html",
            source: TemplateError::Unclosed { offset: 7 },
        };
        assert_eq!(
            error.to_string(),
            "Malformed template in html: placeholder opened at byte 7 is never closed"
        );

        let error = CampaignError::from(DispatchError::Invariant("boom".to_string()));
        assert_eq!(error.to_string(), "Dispatch invariant violated: boom");
    }
}
