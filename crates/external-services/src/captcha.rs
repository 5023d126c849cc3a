use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::{IntegrationError, ensure_success};

pub const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, IntegrationError>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: Arc<SecretString>,
    endpoint: String,
}

impl RecaptchaVerifier {
    #[must_use]
    pub fn new(client: reqwest::Client, secret: impl Into<String>) -> Self {
        Self {
            client,
            secret: Arc::new(SecretString::from(secret.into())),
            endpoint: RECAPTCHA_VERIFY_URL.to_string(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, IntegrationError> {
        let mut form = vec![
            ("secret", self.secret.expose_secret()),
            ("response", token),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }
        let resp = self.client.post(&self.endpoint).form(&form).send().await?;
        let body: SiteVerifyResponse = ensure_success(resp).await?.json().await?;
        if !body.success {
            warn!(errors = ?body.error_codes, "captcha rejected");
        }
        Ok(body.success)
    }
}

/// Accepts or rejects every token; stands in when no secret is configured.
#[derive(Debug, Clone, Copy)]
pub struct StaticCaptchaVerifier {
    pub accept: bool,
}

#[async_trait]
impl CaptchaVerifier for StaticCaptchaVerifier {
    async fn verify(
        &self,
        token: &str,
        _remote_ip: Option<&str>,
    ) -> Result<bool, IntegrationError> {
        Ok(self.accept && !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_verify_response_reads_error_codes() {
        let parsed: SiteVerifyResponse = serde_json::from_str(
            r#"{"success":false,"error-codes":["invalid-input-response"]}"#,
        )
        .expect("parse");
        assert!(!parsed.success);
        assert_eq!(parsed.error_codes, vec!["invalid-input-response"]);

        let ok: SiteVerifyResponse =
            serde_json::from_str(r#"{"success":true}"#).expect("parse");
        assert!(ok.success);
    }

    #[tokio::test]
    async fn static_verifier_rejects_blank_tokens() {
        let verifier = StaticCaptchaVerifier { accept: true };
        assert!(verifier.verify("token", None).await.expect("verify"));
        assert!(!verifier.verify("  ", None).await.expect("verify"));
        let closed = StaticCaptchaVerifier { accept: false };
        assert!(!closed.verify("token", None).await.expect("verify"));
    }
}
