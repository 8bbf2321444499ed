//! Outbound email seam.

use async_trait::async_trait;
use thiserror::Error;

/// Plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: String,
}

/// Delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    /// Message could not be built (bad address).
    #[error("invalid email: {0}")]
    Invalid(String),
    /// Relay refused or unreachable.
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns error if the message is malformed or the relay fails.
    async fn send(&self, email: Email) -> Result<(), MailError>;
}
