use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{IntegrationError, ensure_success};

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleIdentity {
    pub email: String,
    pub name: Option<String>,
    pub email_verified: bool,
}

#[async_trait]
pub trait GoogleIdentityVerifier: Send + Sync {
    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleIdentity, IntegrationError>;
}

/// tokeninfo returns every claim as a string.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
}

fn identity_from_tokeninfo(
    info: TokenInfo,
    client_id: &str,
) -> Result<GoogleIdentity, IntegrationError> {
    if info.aud != client_id {
        return Err(IntegrationError::Rejected(
            "id token was issued for another client".to_string(),
        ));
    }
    let email = info
        .email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| IntegrationError::Decode("id token carries no email".to_string()))?;
    Ok(GoogleIdentity {
        email,
        name: info.name,
        email_verified: info.email_verified.as_deref() == Some("true"),
    })
}

#[derive(Debug, Clone)]
pub struct GoogleTokenInfoVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleTokenInfoVerifier {
    #[must_use]
    pub fn new(client: reqwest::Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            endpoint: GOOGLE_TOKENINFO_URL.to_string(),
        }
    }
}

#[async_trait]
impl GoogleIdentityVerifier for GoogleTokenInfoVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleIdentity, IntegrationError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await?;
        let info: TokenInfo = match ensure_success(resp).await {
            Ok(resp) => resp.json().await?,
            // tokeninfo answers 400 for malformed or expired tokens
            Err(IntegrationError::Upstream { status: 400, .. }) => {
                return Err(IntegrationError::Rejected("invalid id token".to_string()));
            }
            Err(other) => return Err(other),
        };
        identity_from_tokeninfo(info, &self.client_id)
    }
}

/// Maps fixed tokens to identities.
#[derive(Debug, Default, Clone)]
pub struct StaticGoogleVerifier {
    identities: HashMap<String, GoogleIdentity>,
}

impl StaticGoogleVerifier {
    #[must_use]
    pub fn with_identity(mut self, token: impl Into<String>, identity: GoogleIdentity) -> Self {
        self.identities.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl GoogleIdentityVerifier for StaticGoogleVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleIdentity, IntegrationError> {
        self.identities
            .get(id_token)
            .cloned()
            .ok_or_else(|| IntegrationError::Rejected("invalid id token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str, verified: &str) -> TokenInfo {
        serde_json::from_value(serde_json::json!({
            "aud": aud,
            "email": "maya@example.com",
            "email_verified": verified,
            "name": "Maya",
            "exp": "1893456000"
        }))
        .expect("tokeninfo")
    }

    #[test]
    fn tokeninfo_must_target_our_client() {
        let identity = identity_from_tokeninfo(info("client-1", "true"), "client-1").expect("ok");
        assert_eq!(identity.email, "maya@example.com");
        assert!(identity.email_verified);

        assert!(matches!(
            identity_from_tokeninfo(info("client-2", "true"), "client-1"),
            Err(IntegrationError::Rejected(_))
        ));
    }

    #[test]
    fn unverified_email_flag_is_preserved() {
        let identity = identity_from_tokeninfo(info("client-1", "false"), "client-1").expect("ok");
        assert!(!identity.email_verified);
    }

    #[tokio::test]
    async fn static_verifier_knows_only_registered_tokens() {
        let verifier = StaticGoogleVerifier::default().with_identity(
            "good",
            GoogleIdentity {
                email: "maya@example.com".to_string(),
                name: None,
                email_verified: true,
            },
        );
        assert!(verifier.verify_id_token("good").await.is_ok());
        assert!(matches!(
            verifier.verify_id_token("bad").await,
            Err(IntegrationError::Rejected(_))
        ));
    }
}
