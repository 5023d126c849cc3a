pub mod otp;
pub mod password;
pub mod strength;
pub mod token;

use thiserror::Error;

pub use otp::{generate_otp, hash_otp, issue_challenge, verify_challenge};
pub use password::{
    PasswordPolicy, hash_password, password_in_history, validate_new_password, verify_password,
};
pub use strength::{MIN_ACCEPTED_SCORE, StrengthReport, estimate_strength};
pub use token::{IssuedToken, JwtIssuer, SessionClaims};

pub const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password must be at least {min} characters.")]
    PasswordTooShort { min: usize },
    #[error("Password must be between {min} and {max} characters.")]
    PasswordLengthOutOfRange { min: usize, max: usize },
    #[error("Password cannot contain username.")]
    PasswordContainsUsername,
    #[error("Password is not strong enough. Try adding more complexity.")]
    PasswordTooWeak { suggestions: Vec<String> },
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("No OTP has been issued")]
    OtpMissing,
    #[error("OTP was issued for a different step")]
    OtpPurposeMismatch,
    #[error("OTP has expired")]
    OtpExpired,
    #[error("Invalid OTP")]
    OtpInvalid,
    #[error("jwt secret is not configured")]
    MissingSecret,
    #[error("token encoding failed: {0}")]
    TokenEncode(String),
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token has expired")]
    TokenExpired,
}

/// Devices are identified by their User-Agent string.
#[must_use]
pub fn device_identity(user_agent: Option<&str>) -> String {
    user_agent
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map_or_else(|| UNKNOWN_DEVICE.to_string(), str::to_string)
}

/// Accepts only the `Bearer <token>` form.
#[must_use]
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let header = header?;
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
