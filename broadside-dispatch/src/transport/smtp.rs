//! SMTP relay transport backed by `lettre`.

use std::time::Duration;

use async_trait::async_trait;
use broadside_common::{internal, tracing};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;

use super::{Transport, TransportError};
use crate::{address::EmailAddress, job::Payload};

const fn default_port() -> u16 {
    587
}

const fn default_timeout() -> u64 {
    10
}

/// How the connection to the relay is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS
    #[default]
    StartTls,
    /// Implicit TLS from the first byte
    Tls,
    /// No encryption at all. Local relays and test servers only.
    Plaintext,
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    /// Default: 587
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sender mailbox, e.g. `"Acme Marketing <news@acme.test>"`
    pub from: String,

    /// Reply-To mailbox; the sender is used when absent
    #[serde(default)]
    pub reply_to: Option<String>,

    #[serde(default)]
    pub tls: SmtpTls,

    /// Connection timeout for the relay
    ///
    /// Default: 10 seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Sends each payload as a plain-text + HTML alternative message.
#[derive(Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Mailbox,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("from", &self.from)
            .field("reply_to", &self.reply_to)
            .finish_non_exhaustive()
    }
}

fn mailbox(value: &str) -> Result<Mailbox, TransportError> {
    value
        .parse()
        .map_err(|e| TransportError::Build(format!("invalid mailbox {value:?}: {e}")))
}

impl SmtpTransport {
    /// Build the relay client. No connection is made until the first send.
    ///
    /// # Errors
    ///
    /// Fails if the sender or reply-to mailbox does not parse, or the relay
    /// host cannot be used for TLS.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from = mailbox(&config.from)?;
        let reply_to = config
            .reply_to
            .as_deref()
            .map_or_else(|| Ok(from.clone()), mailbox)?;

        let mut builder = match config.tls {
            SmtpTls::Plaintext => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Build(e.to_string()))?,
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Build(e.to_string()))?,
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        internal!(
            level = DEBUG,
            host = %config.host,
            port = config.port,
            tls = ?config.tls,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            reply_to,
        })
    }

    fn build_message(&self, recipient: &EmailAddress, payload: &Payload) -> Result<Message, TransportError> {
        Message::builder()
            .from(self.from.clone())
            .reply_to(self.reply_to.clone())
            .to(mailbox(recipient.as_str())?)
            .subject(payload.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                payload.text.clone(),
                payload.html.clone(),
            ))
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, recipient: &EmailAddress, payload: &Payload) -> Result<(), TransportError> {
        let message = self.build_message(recipient, payload)?;

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::trace!(
                    recipient = %recipient,
                    code = %response.code(),
                    "Relay accepted message"
                );
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(TransportError::Rejected(e.to_string())),
            Err(e) => Err(TransportError::Unavailable(e.to_string())),
        }
    }
}
