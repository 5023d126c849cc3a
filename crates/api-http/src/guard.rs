use std::{convert::Infallible, net::SocketAddr};

use account_auth::{AuthError, UNKNOWN_DEVICE, extract_bearer};
use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE, USER_AGENT},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use booking_service::{ADMIN_REQUIRED, Actor, ClientInfo};
use ticket_domain::{ActivityLog, GUEST_USER, LogLevel};
use tracing::debug;

use crate::{AppState, error::ApiError};

pub const SESSION_COOKIE: &str = "token";
pub const MISSING_TOKEN: &str = "Authorization token is missing or invalid";

/// Who is calling and from where, as written into activity logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub method: String,
    pub url: String,
    pub ip: Option<String>,
    pub device: String,
}

impl RequestMeta {
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        let url = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(&parts.uri, |original| &original.0)
            .to_string();
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let device = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .filter(|agent| !agent.trim().is_empty())
            .unwrap_or(UNKNOWN_DEVICE)
            .to_string();
        Self {
            method: parts.method.to_string(),
            url,
            ip,
            device,
        }
    }

    #[must_use]
    pub fn client(&self) -> ClientInfo {
        ClientInfo::new(self.device.clone(), self.ip.clone())
    }

    #[must_use]
    pub fn log(&self, level: LogLevel, message: &str, user: impl Into<String>) -> ActivityLog {
        ActivityLog::new(level, message, user).with_request(
            self.method.clone(),
            self.url.clone(),
            self.ip.clone(),
        )
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Bearer header first, then the session cookie.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    extract_bearer(bearer)
        .map(str::to_string)
        .or_else(|| cookie_token(headers))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    User,
    Admin,
}

impl Guard {
    fn missing_message(self) -> &'static str {
        match self {
            Self::User => "Authentication failed: missing or invalid token",
            Self::Admin => "Authorization failed: missing or invalid token",
        }
    }

    fn error_message(self) -> &'static str {
        match self {
            Self::User => "Authentication error",
            Self::Admin => "Authorization error",
        }
    }

    fn expired_message(self) -> &'static str {
        match self {
            Self::User => "Authentication failed",
            Self::Admin => "Authorization failed",
        }
    }
}

async fn authenticate(parts: &Parts, state: &AppState, guard: Guard) -> Result<Actor, ApiError> {
    let meta = RequestMeta::from_parts(parts);
    let activity = &state.services.activity;

    let Some(token) = session_token(&parts.headers) else {
        activity
            .record(meta.log(LogLevel::Warn, guard.missing_message(), GUEST_USER))
            .await;
        return Err(ApiError::unauthorized(MISSING_TOKEN));
    };

    let claims = match state.services.accounts.jwt().verify(&token) {
        Ok(claims) => claims,
        Err(err) => {
            activity
                .record(
                    meta.log(LogLevel::Error, guard.error_message(), GUEST_USER)
                        .with_error(err.to_string()),
                )
                .await;
            let message = match err {
                AuthError::TokenExpired => guard.expired_message(),
                _ => "Invalid token",
            };
            return Err(ApiError::unauthorized(message));
        }
    };

    let actor = Actor::from(&claims);
    match guard {
        Guard::User => {
            activity
                .record(meta.log(LogLevel::Info, "Authentication successful", actor.label()))
                .await;
        }
        Guard::Admin if !actor.is_admin => {
            activity
                .record(meta.log(
                    LogLevel::Warn,
                    "Permission denied: not an admin",
                    actor.label(),
                ))
                .await;
            return Err(ApiError(booking_service::ServiceError::forbidden(
                ADMIN_REQUIRED,
            )));
        }
        Guard::Admin => {
            activity
                .record(meta.log(LogLevel::Info, "Admin access granted", actor.label()))
                .await;
        }
    }
    debug!(user_id = %actor.user_id, admin = actor.is_admin, url = %meta.url, "request authenticated");
    Ok(actor)
}

/// A caller holding a valid session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Actor);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, Guard::User).await.map(Self)
    }
}

/// A caller whose session token carries the admin flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub Actor);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, Guard::Admin).await.map(Self)
    }
}

pub async fn public_guard(
    State(state): State<AppState>,
    meta: RequestMeta,
    request: Request,
    next: Next,
) -> Response {
    state
        .services
        .activity
        .record(meta.log(LogLevel::Info, "Public route accessed", GUEST_USER))
        .await;
    next.run(request).await
}
