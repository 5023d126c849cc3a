use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthError;
use crate::strength::{MIN_ACCEPTED_SCORE, estimate_strength};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_len: usize,
    pub max_len: Option<usize>,
}

impl PasswordPolicy {
    /// Sign-up only enforces a lower bound.
    pub const REGISTRATION: Self = Self {
        min_len: 8,
        max_len: None,
    };

    pub const RESET: Self = Self {
        min_len: 8,
        max_len: Some(16),
    };
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::PasswordHash(e.to_string())),
    }
}

pub fn validate_new_password(
    password: &str,
    username: &str,
    policy: PasswordPolicy,
) -> Result<(), AuthError> {
    let len = password.chars().count();
    match policy.max_len {
        Some(max) if len < policy.min_len || len > max => {
            return Err(AuthError::PasswordLengthOutOfRange {
                min: policy.min_len,
                max,
            });
        }
        None if len < policy.min_len => {
            return Err(AuthError::PasswordTooShort {
                min: policy.min_len,
            });
        }
        _ => {}
    }
    let username = username.trim().to_lowercase();
    if !username.is_empty() && password.to_lowercase().contains(&username) {
        return Err(AuthError::PasswordContainsUsername);
    }
    let report = estimate_strength(password, &[username.as_str()]);
    if report.score < MIN_ACCEPTED_SCORE {
        return Err(AuthError::PasswordTooWeak {
            suggestions: report.suggestions,
        });
    }
    Ok(())
}

/// True when `password` matches any stored hash. Unparsable entries are
/// skipped so one corrupt history row cannot block a reset.
pub fn password_in_history(password: &str, hashes: &[String]) -> bool {
    hashes
        .iter()
        .any(|hash| verify_password(password, hash).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round() {
        let hash = hash_password("Orange#Rocket42").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Orange#Rocket42", &hash).expect("verify"));
        assert!(!verify_password("orange#rocket42", &hash).expect("verify"));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("whatever", "not-a-phc-string"),
            Err(AuthError::PasswordHash(_))
        ));
    }

    #[test]
    fn policy_enforces_length_and_username() {
        assert!(matches!(
            validate_new_password("Ab1!", "sita", PasswordPolicy::REGISTRATION),
            Err(AuthError::PasswordTooShort { min: 8 })
        ));
        assert!(matches!(
            validate_new_password("Xq9!mT4#vL2@pR7$", "sita", PasswordPolicy::RESET),
            Ok(())
        ));
        assert!(matches!(
            validate_new_password("Xq9!mT4#vL2@pR7$z", "sita", PasswordPolicy::RESET),
            Err(AuthError::PasswordLengthOutOfRange { max: 16, .. })
        ));
        assert!(matches!(
            validate_new_password("Ab1!", "sita", PasswordPolicy::RESET),
            Err(AuthError::PasswordLengthOutOfRange { min: 8, max: 16 })
        ));
        assert!(matches!(
            validate_new_password("MySITA#Pass9921", "Sita", PasswordPolicy::REGISTRATION),
            Err(AuthError::PasswordContainsUsername)
        ));
    }

    #[test]
    fn policy_rejects_weak_password_with_suggestions() {
        let err = validate_new_password("password1", "hari", PasswordPolicy::REGISTRATION)
            .expect_err("weak");
        match err {
            AuthError::PasswordTooWeak { suggestions } => assert!(!suggestions.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn history_check_matches_previous_hashes() {
        let old = hash_password("Kettle$Moon77").expect("hash");
        let history = vec!["garbage".to_string(), old];
        assert!(password_in_history("Kettle$Moon77", &history));
        assert!(!password_in_history("Kettle$Moon78", &history));
    }
}
