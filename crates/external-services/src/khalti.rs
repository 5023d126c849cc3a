use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{IntegrationError, ensure_success};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInitiation {
    pub return_url: String,
    pub website_url: String,
    /// Khalti amounts are in paisa.
    pub amount: u64,
    pub purchase_order_id: String,
    pub purchase_order_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<PaymentCustomer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub pidx: String,
    pub payment_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Completed,
    Pending,
    Initiated,
    Refunded,
    Expired,
    UserCanceled,
    Other(String),
}

impl GatewayPaymentStatus {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "Completed" => Self::Completed,
            "Pending" => Self::Pending,
            "Initiated" => Self::Initiated,
            "Refunded" => Self::Refunded,
            "Expired" => Self::Expired,
            "User canceled" => Self::UserCanceled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Pending and initiated payments may still complete.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Initiated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLookup {
    pub pidx: String,
    pub status: GatewayPaymentStatus,
    pub total_amount: u64,
    pub transaction_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PaymentInitiation)
    -> Result<PaymentSession, IntegrationError>;

    async fn lookup(&self, pidx: &str) -> Result<PaymentLookup, IntegrationError>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    pidx: String,
    status: String,
    total_amount: u64,
    transaction_id: Option<String>,
}

impl From<LookupResponse> for PaymentLookup {
    fn from(value: LookupResponse) -> Self {
        Self {
            pidx: value.pidx,
            status: GatewayPaymentStatus::parse(&value.status),
            total_amount: value.total_amount,
            transaction_id: value.transaction_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Khalti ePayment v2.
#[derive(Debug, Clone)]
pub struct KhaltiGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: Arc<SecretString>,
}

impl KhaltiGateway {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: Arc::new(SecretString::from(secret_key.into())),
        }
    }

    fn authorization(&self) -> String {
        format!("Key {}", self.secret_key.expose_secret())
    }
}

#[async_trait]
impl PaymentGateway for KhaltiGateway {
    async fn initiate(
        &self,
        request: &PaymentInitiation,
    ) -> Result<PaymentSession, IntegrationError> {
        let resp = self
            .client
            .post(format!("{}/epayment/initiate/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(request)
            .send()
            .await?;
        let session: PaymentSession = ensure_success(resp).await?.json().await?;
        info!(
            pidx = %session.pidx,
            purchase_order_id = %request.purchase_order_id,
            "khalti payment initiated"
        );
        Ok(session)
    }

    async fn lookup(&self, pidx: &str) -> Result<PaymentLookup, IntegrationError> {
        let resp = self
            .client
            .post(format!("{}/epayment/lookup/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&serde_json::json!({ "pidx": pidx }))
            .send()
            .await?;
        let body: LookupResponse = ensure_success(resp).await?.json().await?;
        Ok(body.into())
    }
}

/// Gateway double. Every initiated payment looks up as completed for the
/// full amount unless a test overrides it.
#[derive(Debug, Default, Clone)]
pub struct FakePaymentGateway {
    payments: Arc<Mutex<HashMap<String, PaymentLookup>>>,
}

impl FakePaymentGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lookup(&self, lookup: PaymentLookup) -> Result<(), IntegrationError> {
        self.payments
            .lock()
            .map_err(|_| IntegrationError::LockPoisoned)?
            .insert(lookup.pidx.clone(), lookup);
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn initiate(
        &self,
        request: &PaymentInitiation,
    ) -> Result<PaymentSession, IntegrationError> {
        let pidx = format!("fake-{}", Uuid::now_v7().simple());
        self.set_lookup(PaymentLookup {
            pidx: pidx.clone(),
            status: GatewayPaymentStatus::Completed,
            total_amount: request.amount,
            transaction_id: Some(format!("txn-{pidx}")),
        })?;
        Ok(PaymentSession {
            payment_url: format!("{}?pidx={pidx}", request.return_url),
            pidx,
        })
    }

    async fn lookup(&self, pidx: &str) -> Result<PaymentLookup, IntegrationError> {
        self.payments
            .lock()
            .map_err(|_| IntegrationError::LockPoisoned)?
            .get(pidx)
            .cloned()
            .ok_or_else(|| IntegrationError::Upstream {
                status: 404,
                body: format!("unknown pidx {pidx}"),
            })
    }
}
