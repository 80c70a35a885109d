use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::ReportNotifier;

/// SMTP sender for the teardown error report.
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    /// Build from `SMTP_HOST` (required), `SMTP_PORT`, `SMTP_USER`/`SMTP_PASS`
    /// and `NOTIFY_EMAIL_FROM`. Without credentials an unauthenticated relay
    /// (e.g. a local MTA) is assumed.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").unwrap_or_else(|_| default_from());

        let mailer = match (std::env::var("SMTP_USER"), std::env::var("SMTP_PASS")) {
            (Ok(user), Ok(pass)) => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .context("invalid SMTP_HOST")?
                .credentials(Credentials::new(user, pass)),
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
        };
        let mailer = match std::env::var("SMTP_PORT") {
            Ok(p) => mailer.port(p.parse().context("invalid SMTP_PORT")?),
            Err(_) => mailer,
        }
        .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        Ok(Self { mailer, from })
    }
}

/// `user@host` of the running process.
fn default_from() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "freightfeed".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{user}@{host}")
}

#[async_trait::async_trait]
impl ReportNotifier for EmailSender {
    async fn send_report(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let to: Mailbox = to.parse().context("invalid report address")?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
