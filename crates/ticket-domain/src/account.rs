use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Register,
    Login,
    PasswordReset,
}

impl OtpPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl std::str::FromStr for OtpPurpose {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "register" => Ok(Self::Register),
            "login" => Ok(Self::Login),
            "password_reset" => Ok(Self::PasswordReset),
            other => Err(DomainError::UnknownOtpPurpose(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    Google,
}

impl AuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
        }
    }
}

impl std::str::FromStr for AuthProvider {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "password" => Ok(Self::Password),
            "google" => Ok(Self::Google),
            other => Err(DomainError::UnknownAuthProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedLoginOutcome {
    Remaining(u32),
    Locked { until: DateTime<Utc> },
}

/// Stored account. Never serialized to clients; see [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub phone_number: String,
    pub email: String,
    pub password_hash: String,
    pub old_password_hashes: Vec<String>,
    pub is_admin: bool,
    pub is_verified: bool,
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub password_expires_at: DateTime<Utc>,
    pub otp: Option<OtpChallenge>,
    pub reset_otp: Option<OtpChallenge>,
    pub login_devices: Vec<String>,
    pub remembered_devices: Vec<String>,
    pub auth_provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }

    pub fn record_failed_login(
        &mut self,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> FailedLoginOutcome {
        // a lapsed lock starts a fresh window
        if self.lock_until.is_some_and(|until| until <= now) {
            self.login_attempts = 0;
            self.lock_until = None;
        }
        self.login_attempts = self.login_attempts.saturating_add(1);
        if self.login_attempts >= policy.max_attempts {
            let until = now + policy.lock_duration;
            self.lock_until = Some(until);
            FailedLoginOutcome::Locked { until }
        } else {
            FailedLoginOutcome::Remaining(policy.max_attempts - self.login_attempts)
        }
    }

    pub fn reset_login_attempts(&mut self) {
        self.login_attempts = 0;
        self.lock_until = None;
    }

    #[must_use]
    pub fn password_expired(&self, now: DateTime<Utc>) -> bool {
        self.password_expires_at < now
    }

    #[must_use]
    pub fn remembers_device(&self, device: &str) -> bool {
        self.remembered_devices.iter().any(|d| d == device)
    }

    pub fn remember_device(&mut self, device: &str) {
        if !self.remembers_device(device) {
            self.remembered_devices.push(device.to_string());
        }
    }

    pub fn forget_device(&mut self, device: &str) {
        self.remembered_devices.retain(|d| d != device);
    }

    pub fn record_login_device(&mut self, device: &str) {
        if !self.login_devices.iter().any(|d| d == device) {
            self.login_devices.push(device.to_string());
        }
    }

    pub fn rotate_password(
        &mut self,
        new_hash: String,
        history_cap: usize,
        now: DateTime<Utc>,
        max_age: Duration,
    ) {
        self.old_password_hashes.push(new_hash.clone());
        let cap = history_cap.max(1);
        if self.old_password_hashes.len() > cap {
            let excess = self.old_password_hashes.len() - cap;
            self.old_password_hashes.drain(..excess);
        }
        self.password_hash = new_hash;
        self.password_expires_at = now + max_age;
    }

    #[must_use]
    pub fn profile(&self, current_device: &str) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            phone_number: self.phone_number.clone(),
            email: self.email.clone(),
            is_admin: self.is_admin,
            is_verified: self.is_verified,
            remember_device: self.remembers_device(current_device),
            login_devices: self.login_devices.clone(),
            remembered_devices: self.remembered_devices.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub phone_number: String,
    pub email: String,
    pub is_admin: bool,
    pub is_verified: bool,
    pub remember_device: bool,
    pub login_devices: Vec<String>,
    pub remembered_devices: Vec<String>,
    pub created_at: DateTime<Utc>,
}
