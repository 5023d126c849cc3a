use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use ticket_domain::{OtpChallenge, OtpPurpose};

use crate::AuthError;

pub const OTP_MIN: u32 = 100_000;
pub const OTP_MAX: u32 = 999_999;

#[must_use]
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

#[must_use]
pub fn hash_otp(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

/// Returns the plain code (to be mailed) and the challenge to store.
#[must_use]
pub fn issue_challenge(
    purpose: OtpPurpose,
    now: DateTime<Utc>,
    ttl: Duration,
) -> (String, OtpChallenge) {
    let code = generate_otp();
    let challenge = OtpChallenge {
        purpose,
        code_hash: hash_otp(&code),
        expires_at: now + ttl,
    };
    (code, challenge)
}

/// Expiry is checked before the code itself.
pub fn verify_challenge(
    challenge: Option<&OtpChallenge>,
    purpose: OtpPurpose,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let challenge = challenge.ok_or(AuthError::OtpMissing)?;
    if challenge.purpose != purpose {
        return Err(AuthError::OtpPurposeMismatch);
    }
    if challenge.expires_at < now {
        return Err(AuthError::OtpExpired);
    }
    if challenge.code_hash != hash_otp(code) {
        return Err(AuthError::OtpInvalid);
    }
    Ok(())
}
