pub mod captcha;
pub mod google;
pub mod khalti;
pub mod mail;

use std::time::Duration;

use thiserror::Error;

pub use captcha::{CaptchaVerifier, RecaptchaVerifier, StaticCaptchaVerifier};
pub use google::{
    GoogleIdentity, GoogleIdentityVerifier, GoogleTokenInfoVerifier, StaticGoogleVerifier,
};
pub use khalti::{
    FakePaymentGateway, GatewayPaymentStatus, KhaltiGateway, PaymentCustomer, PaymentGateway,
    PaymentInitiation, PaymentLookup, PaymentSession,
};
pub use mail::{OtpEmail, OtpEmailKind, OtpMailer, RecordingMailer, SmtpMailer};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("unexpected upstream payload: {0}")]
    Decode(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("integration lock poisoned")]
    LockPoisoned,
}

impl From<reqwest::Error> for IntegrationError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, IntegrationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(IntegrationError::from)
}

/// Turns a non-2xx response into `IntegrationError::Upstream`.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, IntegrationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(IntegrationError::Upstream {
        status: status.as_u16(),
        body,
    })
}
