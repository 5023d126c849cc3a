use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;

use crate::IntegrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpEmailKind {
    Registration,
    LoginVerification,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpEmail {
    pub to: String,
    pub code: String,
    pub kind: OtpEmailKind,
    pub valid_minutes: i64,
}

impl OtpEmail {
    #[must_use]
    pub fn subject(&self) -> &'static str {
        match self.kind {
            OtpEmailKind::Registration => "Welcome to Movie Tickets - Verify Your Email",
            OtpEmailKind::LoginVerification => "Movie Tickets - Verify Your Login",
            OtpEmailKind::PasswordReset => "Movie Tickets - Reset Your Password",
        }
    }

    fn greeting(&self) -> &'static str {
        match self.kind {
            OtpEmailKind::Registration => {
                "Welcome to Movie Tickets! We're excited to have you join us. Please verify your email address by entering this code:"
            }
            OtpEmailKind::LoginVerification => {
                "Welcome back to Movie Tickets! Enter this code to finish signing in:"
            }
            OtpEmailKind::PasswordReset => {
                "We received a request to reset your Movie Tickets password. Enter this code to choose a new one:"
            }
        }
    }

    fn heading(&self) -> &'static str {
        match self.kind {
            OtpEmailKind::Registration => "Verify Your Email Address",
            OtpEmailKind::LoginVerification => "Confirm It's You",
            OtpEmailKind::PasswordReset => "Reset Your Password",
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Hi there,\n\n{greeting}\n\n    {code}\n\nThis code will expire in {minutes} minutes.\n\nIf you didn't request this, please ignore this email. Never share this code with anyone, including Movie Tickets staff.\n",
            greeting = self.greeting(),
            code = self.code,
            minutes = self.valid_minutes,
        )
    }

    /// HTML alternative of [`OtpEmail::body`].
    #[must_use]
    pub fn html_body(&self) -> String {
        HTML_TEMPLATE
            .replace("__HEADING__", self.heading())
            .replace("__GREETING__", &self.greeting().replace('\'', "&#39;"))
            .replace("__CODE__", &self.code)
            .replace("__MINUTES__", &self.valid_minutes.to_string())
            .replace("__YEAR__", &Utc::now().year().to_string())
    }
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap" rel="stylesheet">
  </head>
  <body style="margin: 0; padding: 0; font-family: 'Inter', Arial, sans-serif; line-height: 1.6; color: #1a1a1a; background-color: #f4f4f5;">
    <div style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
      <div style="text-align: center; margin-bottom: 32px;">
        <h1 style="color: #2a7d73; font-size: 32px; font-weight: 700; margin: 0;">Movie Tickets</h1>
        <p style="color: #2a7d73; font-size: 16px; margin: 4px 0 0 0;">Your Gateway to Entertainment</p>
      </div>
      <div style="background-color: #ffffff; border-radius: 16px; padding: 48px 32px; margin: 0 0 24px 0; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.05);">
        <h2 style="margin: 0 0 24px; color: #1a1a1a; font-size: 24px; font-weight: 600; text-align: center;">__HEADING__</h2>
        <p style="margin: 0 0 16px; color: #4b5563; font-size: 16px;">Hi there,</p>
        <p style="margin: 0 0 24px; color: #4b5563; font-size: 16px;">__GREETING__</p>
        <div style="text-align: center; margin: 32px 0;">
          <div style="background-color: #f8fafc; border: 2px dashed #2a7d73; border-radius: 12px; padding: 24px; display: inline-block;">
            <span style="font-family: 'Courier New', monospace; font-size: 36px; font-weight: bold; color: #2a7d73; letter-spacing: 8px;">__CODE__</span>
          </div>
          <p style="margin: 16px 0 0 0; font-size: 14px; color: #64748b;">This code will expire in __MINUTES__ minutes</p>
        </div>
        <p style="margin: 24px 0; color: #4b5563; font-size: 16px;">If you didn't request this, please ignore this email or contact our support team if you have concerns.</p>
        <div style="background-color: #f8fafc; border-radius: 12px; padding: 16px; margin: 32px 0; border-left: 4px solid #2a7d73;">
          <p style="margin: 0; font-size: 14px; color: #64748b;">&#128274; For your security, never share this code with anyone, including Movie Tickets staff.</p>
        </div>
      </div>
      <div style="background-color: #ffffff; border-radius: 16px; padding: 32px; margin: 24px 0; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.05);">
        <h3 style="margin: 0 0 16px; color: #1a1a1a; font-size: 18px; font-weight: 600;">Now Showing</h3>
        <p style="margin: 0; color: #4b5563; font-size: 14px;">Don't miss out on the latest blockbusters! Book your tickets now and enjoy the best cinema experience.</p>
      </div>
      <div style="text-align: center; padding: 32px 0; border-top: 1px solid #e2e8f0;">
        <p style="margin: 0 0 16px; font-size: 14px; color: #64748b;">&copy; __YEAR__ Movie Tickets. All rights reserved.</p>
        <p style="margin: 0 0 24px; font-size: 14px; color: #64748b;">123 Cinema Street, Entertainment District, MB 12345</p>
        <p style="margin: 0; font-size: 12px; color: #94a3b8;">Please do not reply to this email. For assistance, please contact our support team.</p>
      </div>
    </div>
  </body>
</html>
"#;

#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), IntegrationError>;
}

/// Sends OTP mail through an authenticated SMTP relay (Gmail by default).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("sender", &self.sender.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        user: &str,
        password: SecretString,
        sender_name: &str,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        let address = user
            .trim()
            .parse::<Address>()
            .map_err(|e| IntegrationError::Rejected(format!("sender address {user}: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| IntegrationError::Transport(e.to_string()))?
            .credentials(Credentials::new(
                address.to_string(),
                password.expose_secret().to_string(),
            ))
            .timeout(Some(timeout))
            .build();
        Ok(Self {
            transport,
            sender: Mailbox::new(Some(sender_name.to_string()), address),
        })
    }

    fn compose(&self, email: &OtpEmail) -> Result<Message, IntegrationError> {
        let to = email
            .to
            .trim()
            .parse::<Mailbox>()
            .map_err(|e| IntegrationError::Rejected(format!("recipient {}: {e}", email.to)))?;
        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(email.subject())
            .multipart(MultiPart::alternative_plain_html(
                email.body(),
                email.html_body(),
            ))
            .map_err(|e| IntegrationError::Transport(e.to_string()))
    }
}

#[async_trait]
impl OtpMailer for SmtpMailer {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), IntegrationError> {
        let message = self.compose(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;
        info!(kind = ?email.kind, "otp email sent");
        Ok(())
    }
}

/// Keeps every message in memory. Used for local runs and tests; codes are
/// written to the log so a developer can complete OTP flows by hand.
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<OtpEmail>>>,
    fail: bool,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn last_code_for(&self, to: &str) -> Result<Option<String>, IntegrationError> {
        let guard = self.sent.lock().map_err(|_| IntegrationError::LockPoisoned)?;
        Ok(guard
            .iter()
            .rev()
            .find(|email| email.to.eq_ignore_ascii_case(to))
            .map(|email| email.code.clone()))
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_otp(&self, email: &OtpEmail) -> Result<(), IntegrationError> {
        if self.fail {
            return Err(IntegrationError::Transport("mail delivery disabled".to_string()));
        }
        info!(to = %email.to, kind = ?email.kind, code = %email.code, "otp email recorded");
        self.sent
            .lock()
            .map_err(|_| IntegrationError::LockPoisoned)?
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(kind: OtpEmailKind) -> OtpEmail {
        OtpEmail {
            to: "hari@example.com".to_string(),
            code: "482913".to_string(),
            kind,
            valid_minutes: 10,
        }
    }

    #[test]
    fn subjects_follow_the_otp_kind() {
        assert_eq!(
            email(OtpEmailKind::Registration).subject(),
            "Welcome to Movie Tickets - Verify Your Email"
        );
        assert_eq!(
            email(OtpEmailKind::LoginVerification).subject(),
            "Movie Tickets - Verify Your Login"
        );
    }

    #[test]
    fn body_carries_code_and_expiry() {
        let body = email(OtpEmailKind::PasswordReset).body();
        assert!(body.contains("482913"));
        assert!(body.contains("expire in 10 minutes"));
        assert!(body.contains("reset"));
    }

    #[test]
    fn html_body_fills_the_template() {
        let html = email(OtpEmailKind::Registration).html_body();
        assert!(html.contains("Verify Your Email Address"));
        assert!(html.contains("482913"));
        assert!(html.contains("expire in 10 minutes"));
        assert!(html.contains(&format!("&copy; {} Movie Tickets", Utc::now().year())));
        assert!(!html.contains("__"));

        let reset = email(OtpEmailKind::PasswordReset).html_body();
        assert!(reset.contains("Reset Your Password"));
    }

    #[tokio::test]
    async fn smtp_message_has_text_and_html_parts() {
        let mailer = SmtpMailer::new(
            "smtp.gmail.com",
            "tickets@example.com",
            SecretString::from("app-password".to_string()),
            "Movie Tickets",
            Duration::from_secs(5),
        )
        .expect("mailer");
        let message = mailer
            .compose(&email(OtpEmailKind::Registration))
            .expect("compose");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("Subject: Welcome to Movie Tickets - Verify Your Email"));
        assert!(raw.contains("tickets@example.com"));
        assert!(raw.contains("hari@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("482913"));
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_addresses() {
        assert!(matches!(
            SmtpMailer::new(
                "smtp.gmail.com",
                "not an address",
                SecretString::from("x".to_string()),
                "Movie Tickets",
                Duration::from_secs(5),
            ),
            Err(IntegrationError::Rejected(_))
        ));
        let mailer = SmtpMailer::new(
            "smtp.gmail.com",
            "tickets@example.com",
            SecretString::from("x".to_string()),
            "Movie Tickets",
            Duration::from_secs(5),
        )
        .expect("mailer");
        let mut bad = email(OtpEmailKind::LoginVerification);
        bad.to = "nobody".to_string();
        assert!(matches!(
            mailer.compose(&bad),
            Err(IntegrationError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn recording_mailer_returns_latest_code() {
        let mailer = RecordingMailer::new();
        mailer
            .send_otp(&email(OtpEmailKind::Registration))
            .await
            .expect("send");
        let mut second = email(OtpEmailKind::LoginVerification);
        second.code = "111222".to_string();
        mailer.send_otp(&second).await.expect("send");
        assert_eq!(
            mailer.last_code_for("HARI@example.com").expect("lookup"),
            Some("111222".to_string())
        );
    }

    #[tokio::test]
    async fn failing_mailer_reports_transport_error() {
        let mailer = RecordingMailer::failing();
        assert!(matches!(
            mailer.send_otp(&email(OtpEmailKind::Registration)).await,
            Err(IntegrationError::Transport(_))
        ));
    }
}
