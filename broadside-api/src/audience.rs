//! Recipient lists and the filters that narrow them.

use std::path::Path;

use async_trait::async_trait;
use broadside_dispatch::Recipient;
use serde::{Deserialize, Serialize};

use crate::error::AudienceError;

/// Which list a campaign goes to. Anything other than `clients` selects
/// leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AudienceKind {
    #[default]
    Leads,
    Clients,
}

impl From<String> for AudienceKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for AudienceKind {
    fn from(value: &str) -> Self {
        if value == "clients" {
            Self::Clients
        } else {
            Self::Leads
        }
    }
}

/// What an audience is being selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Listing recipients. `interest` narrows leads only.
    Preview,
    /// Sending a campaign. `interest` narrows either list.
    Send,
}

/// Narrows an audience. Absent or empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudienceFilter {
    /// Case-insensitive substring over the descriptive fields
    pub q: Option<String>,
    pub status: Option<String>,
    pub business_type: Option<String>,
    pub source: Option<String>,
    /// Ignored for clients when previewing
    pub interest: Option<String>,
}

fn criterion(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|value| !value.is_empty())
}

fn equals(expected: Option<&String>, actual: Option<&String>) -> bool {
    criterion(expected).is_none_or(|expected| actual.map_or("", String::as_str) == expected)
}

impl AudienceFilter {
    /// Whether `recipient` satisfies every criterion. Address validity is
    /// not considered here.
    pub fn matches(
        &self,
        kind: AudienceKind,
        selection: Selection,
        recipient: &Recipient,
    ) -> bool {
        let interest = match (kind, selection) {
            (AudienceKind::Clients, Selection::Preview) => None,
            _ => self.interest.as_ref(),
        };

        self.matches_query(recipient)
            && equals(self.status.as_ref(), recipient.status.as_ref())
            && equals(self.business_type.as_ref(), recipient.business_type.as_ref())
            && equals(self.source.as_ref(), recipient.source.as_ref())
            && equals(interest, recipient.interest.as_ref())
    }

    fn matches_query(&self, recipient: &Recipient) -> bool {
        let Some(query) = criterion(self.q.as_ref()) else {
            return true;
        };
        let query = query.to_lowercase();

        [
            &recipient.name,
            &recipient.email,
            &recipient.phone,
            &recipient.company,
            &recipient.industry,
            &recipient.business_type,
            &recipient.source,
            &recipient.interest,
        ]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(&query))
    }

    /// Keep the recipients that match and have a usable address, in their
    /// original order.
    pub fn apply(
        &self,
        kind: AudienceKind,
        selection: Selection,
        recipients: Vec<Recipient>,
    ) -> Vec<Recipient> {
        recipients
            .into_iter()
            .filter(|recipient| {
                self.matches(kind, selection, recipient) && recipient.address().is_some()
            })
            .collect()
    }
}

/// Where recipients come from.
#[async_trait]
pub trait AudienceSource: Send + Sync + 'static {
    /// Every recipient of `kind`, unfiltered.
    async fn recipients(&self, kind: AudienceKind) -> Result<Vec<Recipient>, AudienceError>;

    /// The recipients of `kind` that pass `filter`.
    async fn select(
        &self,
        kind: AudienceKind,
        selection: Selection,
        filter: &AudienceFilter,
    ) -> Result<Vec<Recipient>, AudienceError> {
        let recipients = self.recipients(kind).await?;
        Ok(filter.apply(kind, selection, recipients))
    }
}

/// A fixed audience held in memory, usually loaded once from a RON file:
///
/// ```ron
/// (
///     leads: [
///         (id: 1, name: Some("Jane"), email: Some("jane@example.com"), interest: Some("seo")),
///     ],
///     clients: [
///         (id: 7, name: Some("Acme"), email: Some("ops@acme.test"), businessName: Some("Acme Ltd")),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryAudience {
    leads: Vec<Recipient>,
    clients: Vec<Recipient>,
}

impl MemoryAudience {
    pub const fn new(leads: Vec<Recipient>, clients: Vec<Recipient>) -> Self {
        Self { leads, clients }
    }

    /// Load leads and clients from a RON file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a valid audience.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AudienceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| AudienceError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&content).map_err(|source| AudienceError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self, kind: AudienceKind) -> usize {
        match kind {
            AudienceKind::Leads => self.leads.len(),
            AudienceKind::Clients => self.clients.len(),
        }
    }
}

#[async_trait]
impl AudienceSource for MemoryAudience {
    async fn recipients(&self, kind: AudienceKind) -> Result<Vec<Recipient>, AudienceError> {
        Ok(match kind {
            AudienceKind::Leads => self.leads.clone(),
            AudienceKind::Clients => self.clients.clone(),
        })
    }
}
