use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{Email, Notifier, NotifyError};
use crate::config::{NotifyConfig, Secret};

/// Sends mail through an SMTP relay with STARTTLS, authenticating as the
/// sender.
pub struct SmtpNotifier {
    server: String,
    port: u16,
    from: String,
    to: String,
    password: Option<Secret>,
}

impl SmtpNotifier {
    /// # Errors
    /// Returns [`NotifyError::NotConfigured`] if the sender or recipient is
    /// missing.
    pub fn from_config(cfg: &NotifyConfig) -> Result<Self, NotifyError> {
        let from = cfg
            .from
            .clone()
            .ok_or(NotifyError::NotConfigured("NOTIFICATION_EMAIL_FROM"))?;
        let to = cfg
            .to
            .clone()
            .ok_or(NotifyError::NotConfigured("NOTIFICATION_EMAIL_TO"))?;
        Ok(Self {
            server: cfg.smtp_server.clone(),
            port: cfg.smtp_port,
            from,
            to,
            password: cfg.password.clone(),
        })
    }

    /// Build the MIME message without sending it.
    ///
    /// # Errors
    /// Returns an error if an address does not parse or the message cannot
    /// be assembled.
    pub fn build_message(&self, email: &Email) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let message = self.build_message(email)?;

        let mut builder = SmtpTransport::starttls_relay(&self.server)?.port(self.port);
        if let Some(password) = &self.password {
            builder = builder.credentials(Credentials::new(
                self.from.clone(),
                password.expose().to_string(),
            ));
        }
        builder.build().send(&message)?;

        tracing::info!(to = %self.to, subject = %email.subject, "notification email sent");
        Ok(())
    }
}
