//! Outbound email. Delivery goes through the [`EmailSender`] trait so the
//! OTP and verification services stay testable without SMTP; the default
//! implementation is a lettre SMTP transport.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::info;

/// Pluggable sink for transactional email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

/// SMTP configuration.
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

impl EmailConfig {
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let smtp_username = std::env::var("SMTP_USERNAME").ok()?;
        let smtp_password = std::env::var("SMTP_PASSWORD").ok()?;
        let from_email = std::env::var("SMTP_FROM_EMAIL").ok()?;
        let from_name =
            std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Identity".to_string());

        Some(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_email,
            from_name,
        })
    }
}

/// lettre-backed SMTP sender.
pub struct SmtpEmailSender {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { config, mailer })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        let from: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email).parse()?;
        let to_mailbox: Mailbox = to.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        self.mailer.send(email).await?;

        info!(recipient = %to, "email sent");
        Ok(())
    }
}

/// Sink used when SMTP is not configured: logs the delivery attempt and
/// drops the message. Local development only.
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> anyhow::Result<()> {
        tracing::warn!(recipient = %to, subject = %subject, "SMTP not configured, dropping email");
        Ok(())
    }
}

/// Renders and dispatches the product emails.
#[derive(Clone)]
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    app_name: String,
    base_url: String,
}

impl Mailer {
    pub fn new(sender: Arc<dyn EmailSender>, app_name: &str, base_url: &str) -> Self {
        Self {
            sender,
            app_name: app_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Mail a one-time login code. The code itself is the secret; it is
    /// never logged.
    pub async fn send_otp_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>Your {app_name} sign-in code</h2>
  <p>Enter this code to sign in. It expires in 5 minutes.</p>
  <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
  <p>If you didn't request this, you can ignore this email.</p>
</body>
</html>"#,
            app_name = self.app_name,
            code = code,
        );

        self.sender
            .send(to, &format!("Your {} sign-in code", self.app_name), &html)
            .await
    }

    /// Mail an email-verification link carrying the plaintext token.
    pub async fn send_verification_link(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let verify_url = format!(
            "{}/verify-email?token={}",
            self.base_url,
            urlencoding::encode(token)
        );

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>Verify your email</h2>
  <p>Welcome to {app_name}! Confirm your email address to finish setting up your account:</p>
  <p><a href="{verify_url}">Verify email address</a></p>
  <p>Or copy and paste this link into your browser:</p>
  <p style="word-break: break-all;">{verify_url}</p>
  <p>This link expires in 24 hours.</p>
</body>
</html>"#,
            app_name = self.app_name,
            verify_url = verify_url,
        );

        self.sender
            .send(to, &format!("Verify your {} email", self.app_name), &html)
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Records outbound mail for assertions.
    pub struct RecordingSender {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingSender {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), html_body.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSender;
    use super::*;

    #[tokio::test]
    async fn otp_email_contains_code() {
        let sender = RecordingSender::new();
        let mailer = Mailer::new(sender.clone(), "Acme", "https://idp.example.com");

        mailer.send_otp_code("a@b.test", "123456").await.unwrap();

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@b.test");
        assert!(sent[0].2.contains("123456"));
    }

    #[tokio::test]
    async fn verification_email_links_token() {
        let sender = RecordingSender::new();
        let mailer = Mailer::new(sender.clone(), "Acme", "https://idp.example.com/");

        mailer
            .send_verification_link("a@b.test", "tok_abc-123")
            .await
            .unwrap();

        let sent = sender.sent.lock().await;
        assert!(sent[0]
            .2
            .contains("https://idp.example.com/verify-email?token=tok_abc-123"));
    }
}
