//! Outbound mail through Lettre.
//!
//! Delivery is blocking SMTP run on the blocking pool. When no relay is
//! configured the server falls back to [`LogMailer`], which only records the
//! envelope in the logs.

use async_trait::async_trait;
use carhire_core::mail::{Email, MailError, Mailer};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;

/// SMTP relay mailer.
#[derive(Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    from: String,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Mailer for the configured relay.
    #[must_use]
    pub fn new(config: &SmtpConfig) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some(Credentials::new(user.clone(), password.clone())),
            _ => None,
        };
        Self {
            host: config.host.clone(),
            port: config.port,
            credentials,
            from: config.from.clone(),
        }
    }

    fn build_transport(&self) -> Result<SmtpTransport, MailError> {
        let mut builder = SmtpTransport::relay(&self.host)
            .map_err(|e| MailError::Delivery(format!("SMTP relay error: {e}")))?
            .port(self.port);
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        Ok(builder.build())
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError::Invalid(format!("invalid from address: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::Invalid(format!("invalid to address: {e}")))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Invalid(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = self.build_message(&email)?;
        let transport = self.build_transport()?;

        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map_err(|e| MailError::Delivery(format!("failed to send email: {e}")))
        })
        .await
        .map_err(|e| MailError::Delivery(format!("email task failed: {e}")))?
        .map(|_| ())?;

        tracing::debug!(to = %email.to, subject = %email.subject, "Email delivered");
        Ok(())
    }
}

/// Mailer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Mail relay not configured; email logged only");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(&SmtpConfig {
            host: "smtp.test".into(),
            port: 2525,
            username: Some("user".into()),
            password: Some("pass".into()),
            from: "Carhire <no-reply@carhire.test>".into(),
        })
    }

    #[test]
    fn rejects_malformed_recipient() {
        let err = mailer()
            .build_message(&Email {
                to: "not an address".into(),
                subject: "Hi".into(),
                body: "Body".into(),
            })
            .unwrap_err();
        assert!(matches!(err, MailError::Invalid(_)));
    }

    #[test]
    fn builds_plain_text_message() {
        let message = mailer().build_message(&Email {
            to: "user1@carhire.test".into(),
            subject: "Booking confirmed".into(),
            body: "See you soon".into(),
        });
        assert!(message.is_ok());
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        LogMailer
            .send(Email {
                to: "x@y.z".into(),
                subject: "s".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
    }
}
