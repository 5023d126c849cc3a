use account_auth::AuthError;
use audit_store::AuditStoreError;
use chrono::{DateTime, Utc};
use external_services::IntegrationError;
use thiserror::Error;
use ticket_domain::{DomainError, MoneyError, SeatId};
use ticket_store::StoreError;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    WeakPassword {
        message: String,
        suggestions: Vec<String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    Locked {
        message: String,
        until: DateTime<Utc>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Some of the selected seats are no longer available")]
    SeatsUnavailable { seat_ids: Vec<SeatId> },
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

pub const ADMIN_REQUIRED: &str = "Access denied. Admin privileges required.";

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Logs the cause and hides it from the caller.
    pub fn internal(context: &str, cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "{context}");
        Self::Internal("Internal server error".to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::SeatsUnavailable { seat_ids } => Self::SeatsUnavailable { seat_ids },
            StoreError::StatusMismatch { expected, actual } => Self::Conflict(format!(
                "Status changed concurrently (expected {expected}, found {actual})"
            )),
            other => Self::internal("store operation failed", other),
        }
    }
}

impl From<AuditStoreError> for ServiceError {
    fn from(value: AuditStoreError) -> Self {
        Self::internal("audit store operation failed", value)
    }
}

impl From<IntegrationError> for ServiceError {
    fn from(value: IntegrationError) -> Self {
        error!(error = %value, "integration call failed");
        Self::Upstream("External service request failed".to_string())
    }
}

impl From<AuthError> for ServiceError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::PasswordTooShort { .. }
            | AuthError::PasswordLengthOutOfRange { .. }
            | AuthError::PasswordContainsUsername => Self::BadRequest(value.to_string()),
            AuthError::PasswordTooWeak { ref suggestions } => Self::WeakPassword {
                suggestions: suggestions.clone(),
                message: value.to_string(),
            },
            AuthError::OtpMissing | AuthError::OtpPurposeMismatch | AuthError::OtpInvalid => {
                Self::BadRequest(AuthError::OtpInvalid.to_string())
            }
            AuthError::OtpExpired => Self::BadRequest(value.to_string()),
            AuthError::TokenInvalid | AuthError::TokenExpired => {
                Self::Unauthorized(value.to_string())
            }
            AuthError::PasswordHash(_) | AuthError::MissingSecret | AuthError::TokenEncode(_) => {
                Self::internal("credential operation failed", value)
            }
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<MoneyError> for ServiceError {
    fn from(_: MoneyError) -> Self {
        Self::BadRequest("Amount is too large".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_failures_collapse_to_invalid_otp() {
        for err in [
            AuthError::OtpMissing,
            AuthError::OtpPurposeMismatch,
            AuthError::OtpInvalid,
        ] {
            assert_eq!(ServiceError::from(err).to_string(), "Invalid OTP");
        }
        assert_eq!(
            ServiceError::from(AuthError::OtpExpired).to_string(),
            "OTP has expired"
        );
    }

    #[test]
    fn store_failures_hide_database_details() {
        let err = ServiceError::from(StoreError::Database("connection reset".to_string()));
        assert!(matches!(err, ServiceError::Internal(ref msg) if !msg.contains("connection")));
        assert!(matches!(
            ServiceError::from(StoreError::NotFound("booking")),
            ServiceError::NotFound(ref msg) if msg == "booking not found"
        ));
    }

    #[test]
    fn weak_password_keeps_suggestions() {
        let err = ServiceError::from(AuthError::PasswordTooWeak {
            suggestions: vec!["Add another word or two.".to_string()],
        });
        match err {
            ServiceError::WeakPassword {
                suggestions,
                message,
            } => {
                assert_eq!(suggestions.len(), 1);
                assert!(message.starts_with("Password is not strong enough"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
