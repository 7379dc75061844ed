use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AdminEvent, Notifier};

/// Build an authenticated relay from SMTP_HOST / SMTP_USER / SMTP_PASS.
/// `Ok(None)` when SMTP_HOST is unset.
pub fn smtp_from_env() -> Result<Option<AsyncSmtpTransport<Tokio1Executor>>> {
    let Ok(host) = std::env::var("SMTP_HOST") else {
        return Ok(None);
    };
    let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
    let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
        .context("invalid SMTP_HOST")?
        .credentials(Credentials::new(user, pass))
        .build();
    Ok(Some(mailer))
}

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    /// `Ok(None)` unless both SMTP_HOST and NOTIFY_EMAIL_TO are set.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(to_addr) = std::env::var("NOTIFY_EMAIL_TO") else {
            return Ok(None);
        };
        let Some(mailer) = smtp_from_env()? else {
            return Ok(None);
        };
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM")
            .or_else(|_| std::env::var("SMTP_USER"))
            .context("NOTIFY_EMAIL_FROM missing")?;

        let from: Mailbox = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to: Mailbox = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;
        Ok(Some(Self { mailer, from, to }))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn send(&self, ev: &AdminEvent) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("[city-digest] {}", ev.title()))
            .header(header::ContentType::TEXT_PLAIN)
            .body(ev.body())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
