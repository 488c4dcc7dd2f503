//! Outbound SMTP delivery for a single rendered message.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

/// A fully rendered message ready for one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mailbox `{address}`: {reason}")]
    InvalidMailbox { address: String, reason: String },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("send attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("transmit failed: {0}")]
    Transmit(String),
}

impl DeliveryError {
    /// Human-readable cause recorded on the email row.
    pub fn cause(&self) -> String {
        self.to_string()
    }
}

/// One complete delivery attempt per call. Implementations must convert every
/// failure into a [`DeliveryError`] so a single recipient cannot abort a
/// batch, and must not retry: retry policy lives above this layer.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Explicit SMTP endpoint configuration handed to the client constructor.
#[derive(Debug, Clone)]
pub struct SmtpClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    /// STARTTLS upgrade when true, implicit TLS otherwise.
    pub starttls: bool,
    /// Bound on the whole connect-auth-transmit sequence.
    pub timeout: Duration,
}

/// SMTP delivery over lettre, one session per message.
///
/// The transport is rebuilt per attempt so the connection is released on
/// every exit path; pooling would pin a session across attempts and blur the
/// per-attempt timeout.
pub struct SmtpDeliveryClient {
    config: SmtpClientConfig,
    from: Mailbox,
}

impl SmtpDeliveryClient {
    pub fn new(config: SmtpClientConfig) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(&config.from_name, &config.from_email)?;
        Ok(Self { config, from })
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let tls_params = TlsParameters::new(self.config.host.clone())
            .map_err(|err| DeliveryError::Connect(err.to_string()))?;

        let builder = if self.config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|err| DeliveryError::Connect(err.to_string()))?
                .tls(Tls::Required(tls_params))
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .map_err(|err| DeliveryError::Connect(err.to_string()))?
                .tls(Tls::Wrapper(tls_params))
        };

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build())
    }

    fn build_message(&self, message: &OutboundMessage) -> Result<Message, DeliveryError> {
        let to = parse_mailbox(&message.recipient_name, &message.recipient_email)?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative().singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(message.body.clone()),
                ),
            )
            .map_err(|err| DeliveryError::InvalidMailbox {
                address: message.recipient_email.clone(),
                reason: err.to_string(),
            })
    }
}

#[async_trait]
impl DeliveryClient for SmtpDeliveryClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let mail = self.build_message(message)?;
        let mailer = self.build_transport()?;

        match tokio::time::timeout(self.config.timeout, mailer.send(mail)).await {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(err)) => Err(DeliveryError::Transmit(err.to_string())),
            Err(_elapsed) => Err(DeliveryError::Timeout(self.config.timeout)),
        }
    }
}

fn parse_mailbox(name: &str, email: &str) -> Result<Mailbox, DeliveryError> {
    let formatted = if name.trim().is_empty() {
        email.to_string()
    } else {
        format!("{} <{}>", name.trim(), email)
    };

    formatted
        .parse()
        .map_err(|err: lettre::address::AddressError| DeliveryError::InvalidMailbox {
            address: email.to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_includes_display_name() {
        let mailbox = parse_mailbox("Jane Doe", "jane@example.com").expect("mailbox");
        assert_eq!(mailbox.name.as_deref(), Some("Jane Doe"));
        assert_eq!(mailbox.email.to_string(), "jane@example.com");
    }

    #[test]
    fn mailbox_without_name_is_bare_address() {
        let mailbox = parse_mailbox("  ", "jane@example.com").expect("mailbox");
        assert_eq!(mailbox.name, None);
        assert_eq!(mailbox.email.to_string(), "jane@example.com");
    }

    #[test]
    fn invalid_address_is_reported_not_raised() {
        let err = parse_mailbox("", "not-an-address").expect_err("should fail");
        assert!(matches!(err, DeliveryError::InvalidMailbox { .. }));
        assert!(err.cause().contains("not-an-address"));
    }
}
