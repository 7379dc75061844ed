// src/dispatch/mail.rs
use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};

use crate::error::DeliveryError;
use crate::notify::email::smtp_from_env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Per-recipient mail transport.
#[async_trait::async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// `Ok(None)` when SMTP_HOST is unset. Sender is NOTIFY_EMAIL_FROM, else SMTP_USER.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(mailer) = smtp_from_env()? else {
            return Ok(None);
        };
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM")
            .or_else(|_| std::env::var("SMTP_USER"))
            .context("NOTIFY_EMAIL_FROM missing")?;
        let from: Mailbox = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        Ok(Some(Self { mailer, from }))
    }
}

#[async_trait::async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| DeliveryError::Address(mail.to.clone()))?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}
