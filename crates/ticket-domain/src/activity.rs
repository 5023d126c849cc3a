use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{ContactId, LogId};

pub const GUEST_USER: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(DomainError::UnknownLogLevel(other.to_string())),
        }
    }
}

/// One row of the admin-visible activity trail written by the HTTP guards
/// and account flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    #[serde(rename = "_id")]
    pub id: LogId,
    pub level: LogLevel,
    pub message: String,
    pub error: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub user: String,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLog {
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: LogId::new(),
            level,
            message: message.into(),
            error: None,
            method: None,
            url: None,
            user: user.into(),
            ip: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_request(
        mut self,
        method: impl Into<String>,
        url: impl Into<String>,
        ip: Option<String>,
    ) -> Self {
        self.method = Some(method.into());
        self.url = Some(url.into());
        self.ip = ip;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    #[serde(rename = "_id")]
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
