use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use booking_service::ServiceError;
use chrono::{DateTime, Utc};
use platform_core::{ErrorCode, ResponseEnvelope};
use serde::Serialize;
use ticket_domain::SeatId;

/// A service failure on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        Self(value)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ServiceError::BadRequest(message.into()))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self(ServiceError::Unauthorized(message.into()))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::BadRequest(_) | ServiceError::WeakPassword { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) | ServiceError::Locked { .. } => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::SeatsUnavailable { .. } => {
                StatusCode::CONFLICT
            }
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match &self.0 {
            ServiceError::BadRequest(_) => ErrorCode::RequestInvalid,
            ServiceError::WeakPassword { .. } => ErrorCode::WeakPassword,
            ServiceError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServiceError::Forbidden(_) => ErrorCode::Forbidden,
            ServiceError::Locked { .. } => ErrorCode::AccountLocked,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::Conflict(_) => ErrorCode::Conflict,
            ServiceError::SeatsUnavailable { .. } => ErrorCode::SeatsUnavailable,
            ServiceError::Upstream(_) => ErrorCode::UpstreamFailed,
            ServiceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    #[must_use]
    pub fn envelope(&self) -> ResponseEnvelope<ErrorDetails> {
        let details = match &self.0 {
            ServiceError::WeakPassword { suggestions, .. } => Some(ErrorDetails {
                suggestions: Some(suggestions.clone()),
                ..ErrorDetails::default()
            }),
            ServiceError::Locked { until, .. } => Some(ErrorDetails {
                lock_until: Some(*until),
                ..ErrorDetails::default()
            }),
            ServiceError::SeatsUnavailable { seat_ids } => Some(ErrorDetails {
                unavailable_seats: Some(seat_ids.clone()),
                ..ErrorDetails::default()
            }),
            _ => None,
        };
        let message = self.0.to_string();
        match details {
            Some(details) => ResponseEnvelope::err_with(self.code(), message, details),
            None => ResponseEnvelope::err(self.code(), message),
        }
    }
}

/// Extra fields some failures carry next to `success` and `message`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_seats: Option<Vec<SeatId>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
