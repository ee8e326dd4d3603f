use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("Failed to send email: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Outgoing mail to addresses outside the organization
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailerError>;
}

/// Outgoing transport shared through app data; `None` without SMTP settings
#[derive(Clone, Default)]
pub struct MailerHandle(Option<Arc<dyn MailTransport>>);

impl MailerHandle {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self(Some(transport))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn transport(&self) -> Option<&dyn MailTransport> {
        self.0.as_deref()
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailerError> {
        let from = if mail.from_name.is_empty() {
            self.from.clone()
        } else {
            format!("{} <{}>", mail.from_name, self.from)
        };

        let email = Message::builder()
            .from(from.parse()?)
            .to(mail.to.parse()?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)?;

        self.transport.send(email).await?;
        info!(to = %mail.to, "Email sent via SMTP");
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Records every mail instead of sending it
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingMailer {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailerError> {
            let _: lettre::Address = mail.to.parse()?;
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }
}
