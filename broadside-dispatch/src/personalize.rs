//! Literal placeholder substitution.
//!
//! Only `{{name}}`, `{{email}}` and `{{company}}` are recognised. Anything
//! else between double braces is left exactly as written. There is no
//! escaping, nesting or control flow.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CampaignError, TemplateError},
    job::Payload,
};

/// Placeholder names that [`render`] substitutes.
pub const PLACEHOLDERS: [&str; 3] = ["name", "email", "company"];

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Per-recipient placeholder values.
pub type Fields = AHashMap<String, String>;

/// Replace every recognised placeholder in `template` with its value from
/// `fields`. Recognised placeholders without a value render as nothing.
///
/// Substitution is a single left-to-right pass, so values that themselves
/// contain placeholders are inserted verbatim.
pub fn render(template: &str, fields: &Fields) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];

        match after.find(CLOSE) {
            Some(end) if PLACEHOLDERS.contains(&&after[..end]) => {
                out.push_str(fields.get(&after[..end]).map_or("", String::as_str));
                rest = &after[end + CLOSE.len()..];
            }
            _ => {
                out.push('{');
                rest = &rest[start + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Reject templates with a `{{` that is never closed.
///
/// # Errors
///
/// Returns the byte offset of the first unclosed opener.
pub fn validate_template(template: &str) -> Result<(), TemplateError> {
    let mut offset = 0;

    while let Some(start) = template[offset..].find(OPEN) {
        let open_at = offset + start;
        let body = open_at + OPEN.len();
        match template[body..].find(CLOSE) {
            Some(end) => offset = body + end + CLOSE.len(),
            None => return Err(TemplateError::Unclosed { offset: open_at }),
        }
    }

    Ok(())
}

/// Strip markup to get a plain-text fallback. A `<` with no closing `>` is
/// kept as text.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Campaign content before personalisation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignTemplate {
    pub subject: String,
    pub html: String,
    /// Plain-text part. Derived from `html` when absent.
    #[serde(default)]
    pub text: Option<String>,
}

impl CampaignTemplate {
    /// Check the template before any job is built.
    ///
    /// # Errors
    ///
    /// [`CampaignError::MissingContent`] when the subject or HTML body is
    /// blank, [`CampaignError::Template`] when a part has an unclosed
    /// placeholder.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.subject.trim().is_empty() || self.html.trim().is_empty() {
            return Err(CampaignError::MissingContent);
        }

        let parts = [
            ("subject", Some(self.subject.as_str())),
            ("html", Some(self.html.as_str())),
            ("text", self.text.as_deref()),
        ];

        for (field, part) in parts
            .into_iter()
            .filter_map(|(field, part)| part.map(|part| (field, part)))
        {
            validate_template(part).map_err(|source| CampaignError::Template { field, source })?;
        }

        Ok(())
    }

    /// Render subject, HTML and text for one recipient.
    pub fn personalize(&self, fields: &Fields) -> Payload {
        let text = self
            .text
            .as_deref()
            .map_or_else(|| html_to_text(&self.html), str::to_string);

        Payload {
            subject: render(&self.subject, fields),
            html: render(&self.html, fields),
            text: render(&text, fields),
        }
    }
}
