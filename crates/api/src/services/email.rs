//! Email service for contact and booking notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain text
//! templates. Handlers talk to the [`Mailer`] trait so tests can capture
//! messages instead of sending them.

use askama::Template;
use async_trait::async_trait;
use chrono::NaiveDate;
use henhouse_core::Email;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML template for a contact form message.
#[derive(Template)]
#[template(path = "email/contact.html")]
struct ContactEmailHtml<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    message: &'a str,
}

/// Plain text template for a contact form message.
#[derive(Template)]
#[template(path = "email/contact.txt")]
struct ContactEmailText<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    message: &'a str,
}

/// HTML template for a booking request.
#[derive(Template)]
#[template(path = "email/booking.html")]
struct BookingEmailHtml<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    service: &'a str,
    preferred_date: &'a str,
    notes: Option<&'a str>,
}

/// Plain text template for a booking request.
#[derive(Template)]
#[template(path = "email/booking.txt")]
struct BookingEmailText<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    service: &'a str,
    preferred_date: &'a str,
    notes: Option<&'a str>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Address rejected by the message builder.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub recipient: Email,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// Visitor address, so the farm can answer directly.
    pub reply_to: Option<Email>,
}

/// Transactional email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `email`.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] if the message cannot be built or sent.
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;

    /// Check that the transport can reach its server.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] if the check itself fails.
    async fn test_connection(&self) -> Result<bool, EmailError>;
}

/// A validated contact form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub message: String,
}

impl ContactMessage {
    /// Render the notification sent to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn compose(&self, recipient: &Email) -> Result<OutgoingEmail, EmailError> {
        let phone = self.phone.as_deref();
        let html_body = ContactEmailHtml {
            name: &self.name,
            email: self.email.as_str(),
            phone,
            message: &self.message,
        }
        .render()?;
        let text_body = ContactEmailText {
            name: &self.name,
            email: self.email.as_str(),
            phone,
            message: &self.message,
        }
        .render()?;

        Ok(OutgoingEmail {
            recipient: recipient.clone(),
            subject: format!("New message from {}", self.name),
            html_body,
            text_body,
            reply_to: Some(self.email.clone()),
        })
    }
}

/// A validated booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingMessage {
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub service: String,
    pub preferred_date: NaiveDate,
    pub notes: Option<String>,
}

impl BookingMessage {
    /// Render the notification sent to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn compose(&self, recipient: &Email) -> Result<OutgoingEmail, EmailError> {
        let preferred_date = self.preferred_date.format("%A, %B %-d, %Y").to_string();
        let phone = self.phone.as_deref();
        let notes = self.notes.as_deref();

        let html_body = BookingEmailHtml {
            name: &self.name,
            email: self.email.as_str(),
            phone,
            service: &self.service,
            preferred_date: &preferred_date,
            notes,
        }
        .render()?;
        let text_body = BookingEmailText {
            name: &self.name,
            email: self.email.as_str(),
            phone,
            service: &self.service,
            preferred_date: &preferred_date,
            notes,
        }
        .render()?;

        Ok(OutgoingEmail {
            recipient: recipient.clone(),
            subject: format!("Booking request: {} on {}", self.service, self.preferred_date),
            html_body,
            text_body,
            reply_to: Some(self.email.clone()),
        })
    }
}

/// SMTP-backed [`Mailer`].
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Email,
}

impl SmtpMailer {
    /// Create a new mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = build_message(&self.from_address, &email)?;
        self.transport.send(message).await?;

        tracing::info!(to = %email.recipient, subject = %email.subject, "Email sent successfully");
        Ok(())
    }

    async fn test_connection(&self) -> Result<bool, EmailError> {
        Ok(self.transport.test_connection().await?)
    }
}

fn mailbox(address: &Email) -> Result<Mailbox, EmailError> {
    address
        .as_str()
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

/// Build a multipart message with both plain text and HTML versions.
fn build_message(from: &Email, email: &OutgoingEmail) -> Result<Message, EmailError> {
    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(&email.recipient)?)
        .subject(&email.subject);
    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    Ok(builder.multipart(
        MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(email.text_body.clone()),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(email.html_body.clone()),
            ),
    )?)
}
