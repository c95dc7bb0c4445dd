use std::{fmt, str::FromStr};

use mailparse::MailAddr;
use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// A single, syntactically valid mailbox address in its bare `local@domain`
/// form. Display names are stripped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse exactly one mailbox.
    ///
    /// # Errors
    ///
    /// Fails on empty input, group syntax, lists of more than one address,
    /// or anything without both a local part and a domain.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let malformed = |reason: String| AddressError::Malformed {
            input: trimmed.to_string(),
            reason,
        };

        let list = mailparse::addrparse(trimmed).map_err(|e| malformed(e.to_string()))?;
        let mut addresses = list.iter();

        match (addresses.next(), addresses.next()) {
            (None, _) => Err(AddressError::Empty),
            (Some(_), Some(_)) => Err(AddressError::Multiple(trimmed.to_string())),
            (Some(MailAddr::Group(_)), None) => Err(AddressError::Group(trimmed.to_string())),
            (Some(MailAddr::Single(single)), None) => {
                let addr = single.addr.trim();
                match addr.split_once('@') {
                    Some((local, domain))
                        if !local.is_empty()
                            && !domain.is_empty()
                            && !domain.contains('@')
                            && !addr.contains(char::is_whitespace) =>
                    {
                        Ok(Self(addr.to_string()))
                    }
                    _ => Err(malformed("missing local part or domain".to_string())),
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_address() {
        let address = EmailAddress::parse("jane@example.com").unwrap();
        assert_eq!(address.as_str(), "jane@example.com");
        assert_eq!(address.domain(), "example.com");
    }

    #[test]
    fn test_parse_strips_display_name() {
        let address = EmailAddress::parse("Jane Doe <jane@example.com>").unwrap();
        assert_eq!(address.to_string(), "jane@example.com");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let address = EmailAddress::parse("  jane@example.com \n").unwrap();
        assert_eq!(address.as_str(), "jane@example.com");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(EmailAddress::parse("   "), Err(AddressError::Empty));
    }

    #[test]
    fn test_rejects_missing_at() {
        assert!(matches!(
            EmailAddress::parse("not-an-address"),
            Err(AddressError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_multiple() {
        assert!(matches!(
            EmailAddress::parse("a@example.com, b@example.com"),
            Err(AddressError::Multiple(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let parsed: Result<EmailAddress, _> = ron::from_str("\"jane@example.com\"");
        assert_eq!(parsed.unwrap().as_str(), "jane@example.com");

        let parsed: Result<EmailAddress, _> = ron::from_str("\"nobody\"");
        assert!(parsed.is_err());
    }
}
