use std::sync::Arc;

use account_auth::{
    AuthError, IssuedToken, JwtIssuer, PasswordPolicy, hash_otp, hash_password, issue_challenge,
    password_in_history, validate_new_password, verify_challenge, verify_password,
};
use chrono::{DateTime, Duration, Utc};
use external_services::{
    CaptchaVerifier, GoogleIdentityVerifier, IntegrationError, OtpEmail, OtpEmailKind, OtpMailer,
};
use platform_core::AuthSection;
use rand::{Rng, distributions::Alphanumeric};
use ticket_domain::{
    AuthProvider, FailedLoginOutcome, LockoutPolicy, OtpPurpose, UserAccount, UserId,
    UserProfile,
};
use ticket_store::{PasswordChange, StoreError, TicketStore};
use tracing::{info, warn};

use crate::activity::ActivityRecorder;
use crate::context::{Actor, ClientInfo};
use crate::error::ServiceError;

const GOOGLE_PASSWORD_LEN: usize = 48;

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub otp_ttl: Duration,
    pub lockout: LockoutPolicy,
    pub password_max_age: Duration,
    pub password_history: usize,
    pub require_captcha: bool,
    pub admin_emails: Vec<String>,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::minutes(10),
            lockout: LockoutPolicy::default(),
            password_max_age: Duration::days(90),
            password_history: 5,
            require_captcha: true,
            admin_emails: Vec::new(),
        }
    }
}

impl AccountSettings {
    #[must_use]
    pub fn from_auth_section(auth: &AuthSection) -> Self {
        Self {
            otp_ttl: Duration::seconds(auth.otp_ttl_secs),
            lockout: LockoutPolicy {
                max_attempts: auth.max_login_attempts,
                lock_duration: Duration::seconds(auth.lockout_secs),
            },
            password_max_age: Duration::days(auth.password_max_age_days),
            password_history: auth.password_history,
            require_captcha: auth.require_captcha,
            admin_emails: auth.admin_emails.clone(),
        }
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub phone_number: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub email: String,
    pub password: String,
    pub captcha_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub remember_device: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: IssuedToken,
    pub profile: UserProfile,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// Known user on an unremembered device; a login code was mailed.
    OtpRequired,
    /// Email not yet verified; a fresh registration code was mailed.
    RegisterOtpRequired,
}

#[derive(Debug, Clone)]
pub struct GoogleSession {
    pub session: Session,
    pub created: bool,
}

pub struct AccountService {
    store: Arc<dyn TicketStore>,
    mailer: Arc<dyn OtpMailer>,
    captcha: Arc<dyn CaptchaVerifier>,
    google: Arc<dyn GoogleIdentityVerifier>,
    jwt: Arc<JwtIssuer>,
    activity: ActivityRecorder,
    settings: AccountSettings,
}

impl AccountService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        mailer: Arc<dyn OtpMailer>,
        captcha: Arc<dyn CaptchaVerifier>,
        google: Arc<dyn GoogleIdentityVerifier>,
        jwt: Arc<JwtIssuer>,
        activity: ActivityRecorder,
        settings: AccountSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            captcha,
            google,
            jwt,
            activity,
            settings,
        }
    }

    #[must_use]
    pub fn jwt(&self) -> &JwtIssuer {
        &self.jwt
    }

    pub async fn register(&self, input: Registration) -> Result<UserProfile, ServiceError> {
        let username = input.username.trim().to_string();
        let phone_number = input.phone_number.trim().to_string();
        let email = input.email.trim().to_string();
        if !all_present(&[&username, &phone_number, &email, &input.password]) {
            return Err(ServiceError::bad_request("Please enter all fields!"));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::bad_request("User Already Exists!"));
        }
        validate_new_password(&input.password, &username, PasswordPolicy::REGISTRATION)?;
        let password_hash = hash_blocking(input.password).await?;

        let now = Utc::now();
        let (code, challenge) = issue_challenge(OtpPurpose::Register, now, self.settings.otp_ttl);
        let user = UserAccount {
            id: UserId::new(),
            is_admin: self.settings.is_admin_email(&email),
            username,
            phone_number,
            email,
            password_hash: password_hash.clone(),
            old_password_hashes: vec![password_hash],
            is_verified: false,
            login_attempts: 0,
            lock_until: None,
            password_expires_at: now + self.settings.password_max_age,
            otp: Some(challenge),
            reset_otp: None,
            login_devices: Vec::new(),
            remembered_devices: Vec::new(),
            auth_provider: AuthProvider::Password,
            created_at: now,
        };

        self.send_otp(&user.email, code, OtpEmailKind::Registration)
            .await
            .map_err(|_| ServiceError::Internal("OTP send failed".to_string()))?;
        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ServiceError::bad_request("User Already Exists!"));
            }
            Err(err) => return Err(err.into()),
        }

        info!(user_id = %user.id, admin = user.is_admin, "user registered");
        self.activity.info("User registered", user.id.to_string()).await;
        Ok(user.profile(""))
    }

    pub async fn login(
        &self,
        attempt: LoginAttempt,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, ServiceError> {
        if self.settings.require_captcha {
            let token = attempt
                .captcha_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    ServiceError::bad_request("Please confirm that you are not a robot.")
                })?;
            if !self.captcha.verify(token, client.ip.as_deref()).await? {
                return Err(ServiceError::bad_request("Invalid Captcha"));
            }
        }

        let email = attempt.email.trim();
        if !all_present(&[email, &attempt.password]) {
            return Err(ServiceError::bad_request("Please enter all fields"));
        }
        let mut user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::bad_request("User does not exist!"))?;

        let now = Utc::now();
        if let Some(until) = user.lock_until.filter(|until| *until > now) {
            self.activity
                .warn("Login attempt on locked account", user.id.to_string())
                .await;
            return Err(ServiceError::Locked {
                message: format!("Account is locked. Try again after {}", display_time(until)),
                until,
            });
        }

        if !verify_blocking(attempt.password, user.password_hash.clone()).await? {
            let outcome = self
                .store
                .record_failed_login(user.id, now, self.settings.lockout)
                .await?;
            return Err(match outcome {
                FailedLoginOutcome::Remaining(left) => {
                    self.activity
                        .warn("Login failed: invalid password", user.id.to_string())
                        .await;
                    ServiceError::bad_request(format!(
                        "Invalid password. {left} attempt(s) remaining."
                    ))
                }
                FailedLoginOutcome::Locked { until } => {
                    warn!(user_id = %user.id, %until, "account locked after failed logins");
                    self.activity
                        .warn("Account locked after repeated failed logins", user.id.to_string())
                        .await;
                    ServiceError::bad_request(format!(
                        "Your account is locked until {}",
                        display_time(until)
                    ))
                }
            });
        }

        if user.password_expired(now) {
            return Err(ServiceError::bad_request(
                "Password has expired. Please reset your password.",
            ));
        }
        self.store.clear_failed_logins(user.id).await?;

        if !user.is_verified {
            let (code, challenge) =
                issue_challenge(OtpPurpose::Register, now, self.settings.otp_ttl);
            self.store.store_otp(user.id, &challenge).await?;
            self.send_otp(&user.email, code, OtpEmailKind::Registration)
                .await
                .map_err(|_| ServiceError::Internal("Failed to send OTP".to_string()))?;
            return Ok(LoginOutcome::RegisterOtpRequired);
        }

        if !user.remembers_device(&client.device) {
            let (code, challenge) = issue_challenge(OtpPurpose::Login, now, self.settings.otp_ttl);
            self.store.store_otp(user.id, &challenge).await?;
            self.send_otp(&user.email, code, OtpEmailKind::LoginVerification)
                .await
                .map_err(|_| ServiceError::Internal("Failed to send OTP".to_string()))?;
            return Ok(LoginOutcome::OtpRequired);
        }

        self.store.add_login_device(user.id, &client.device).await?;
        user.record_login_device(&client.device);
        self.activity.info("User logged in", user.id.to_string()).await;
        Ok(LoginOutcome::Authenticated(
            self.start_session(&user, &client.device, now)?,
        ))
    }

    pub async fn verify_register_otp(
        &self,
        email: &str,
        otp: &str,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let user = self
            .redeem_otp(email, otp, OtpPurpose::Register, &client.device)
            .await?;
        self.activity.info("Email verified", user.id.to_string()).await;
        self.start_session(&user, &client.device, Utc::now())
    }

    pub async fn verify_login_otp(
        &self,
        email: &str,
        otp: &str,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let user = self
            .redeem_otp(email, otp, OtpPurpose::Login, &client.device)
            .await?;
        self.activity
            .info("User logged in with OTP", user.id.to_string())
            .await;
        self.start_session(&user, &client.device, Utc::now())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ServiceError::bad_request("Please enter your email"));
        }
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;
        let (code, challenge) =
            issue_challenge(OtpPurpose::PasswordReset, Utc::now(), self.settings.otp_ttl);
        self.store.store_otp(user.id, &challenge).await?;
        self.send_otp(&user.email, code, OtpEmailKind::PasswordReset)
            .await
            .map_err(|_| ServiceError::bad_request("Error in sending OTP"))?;
        self.activity
            .info("Password reset requested", user.id.to_string())
            .await;
        Ok(())
    }

    /// The code is compared before its expiry so a wrong code never reveals
    /// whether a reset is pending.
    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        password: &str,
    ) -> Result<(), ServiceError> {
        let email = email.trim();
        if !all_present(&[email, otp, password]) {
            return Err(ServiceError::bad_request("Please enter all fields"));
        }
        let mut user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::bad_request("User not found"))?;

        let code_hash = hash_otp(otp);
        let code_matches = user.reset_otp.as_ref().is_some_and(|challenge| {
            challenge.purpose == OtpPurpose::PasswordReset && challenge.code_hash == code_hash
        });
        if !code_matches {
            return Err(ServiceError::bad_request("Invalid OTP"));
        }
        let now = Utc::now();
        if let Err(AuthError::OtpExpired) =
            verify_challenge(user.reset_otp.as_ref(), OtpPurpose::PasswordReset, otp, now)
        {
            return Err(ServiceError::bad_request("OTP expired"));
        }

        validate_new_password(password, &user.username, PasswordPolicy::RESET)?;
        if history_blocking(password.to_string(), user.old_password_hashes.clone()).await? {
            return Err(ServiceError::bad_request("Password is already in use"));
        }
        let new_hash = hash_blocking(password.to_string()).await?;
        user.rotate_password(
            new_hash,
            self.settings.password_history,
            now,
            self.settings.password_max_age,
        );
        let change = PasswordChange {
            password_hash: user.password_hash.clone(),
            old_password_hashes: user.old_password_hashes.clone(),
            password_expires_at: user.password_expires_at,
        };
        if !self
            .store
            .redeem_password_reset(user.id, &code_hash, &change)
            .await?
        {
            return Err(ServiceError::bad_request("Invalid OTP"));
        }
        info!(user_id = %user.id, "password reset");
        self.activity.info("Password reset", user.id.to_string()).await;
        Ok(())
    }

    pub async fn profile(
        &self,
        actor: &Actor,
        client: &ClientInfo,
    ) -> Result<UserProfile, ServiceError> {
        Ok(self.load_user(actor.user_id).await?.profile(&client.device))
    }

    pub async fn update_profile(
        &self,
        actor: &Actor,
        client: &ClientInfo,
        update: ProfileUpdate,
    ) -> Result<UserProfile, ServiceError> {
        let mut user = self.load_user(actor.user_id).await?;
        if let Some(username) = non_blank(update.username) {
            user.username = username;
        }
        if let Some(phone_number) = non_blank(update.phone_number) {
            user.phone_number = phone_number;
        }
        if let Some(email) = non_blank(update.email) {
            if !email.eq_ignore_ascii_case(&user.email) {
                if let Some(other) = self.store.find_user_by_email(&email).await? {
                    if other.id != user.id {
                        return Err(ServiceError::Conflict("Email is already in use".to_string()));
                    }
                }
            }
            user.email = email;
        }
        match update.remember_device {
            Some(true) => user.remember_device(&client.device),
            Some(false) => user.forget_device(&client.device),
            None => {}
        }
        match self.store.update_user_profile(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ServiceError::Conflict("Email is already in use".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        self.activity.info("Profile updated", actor.label()).await;
        Ok(user.profile(&client.device))
    }

    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<UserProfile>, ServiceError> {
        actor.require_admin()?;
        Ok(self
            .store
            .list_users()
            .await?
            .iter()
            .map(|user| user.profile(""))
            .collect())
    }

    pub async fn delete_account(&self, actor: &Actor) -> Result<(), ServiceError> {
        if !self.store.delete_user(actor.user_id).await? {
            return Err(ServiceError::not_found("User not found"));
        }
        info!(user_id = %actor.user_id, "account deleted");
        self.activity.info("Account deleted", actor.label()).await;
        Ok(())
    }

    /// Sessions are stateless tokens; logging out only leaves a trail and
    /// lets the HTTP layer clear the cookie.
    pub async fn logout(&self, actor: &Actor) -> Result<(), ServiceError> {
        self.activity.info("User logged out", actor.label()).await;
        Ok(())
    }

    pub async fn google_login(
        &self,
        id_token: &str,
        client: &ClientInfo,
    ) -> Result<GoogleSession, ServiceError> {
        let identity = self.verify_google(id_token).await?;
        if !identity.email_verified {
            return Err(ServiceError::Unauthorized(
                "Google account email is not verified".to_string(),
            ));
        }
        let now = Utc::now();

        if let Some(mut user) = self.store.find_user_by_email(&identity.email).await? {
            self.store.add_login_device(user.id, &client.device).await?;
            user.record_login_device(&client.device);
            self.activity
                .info("User logged in with Google", user.id.to_string())
                .await;
            return Ok(GoogleSession {
                session: self.start_session(&user, &client.device, now)?,
                created: false,
            });
        }

        let username = identity
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(
                || identity.email.split('@').next().unwrap_or_default().to_string(),
                str::to_string,
            );
        let password_hash = hash_blocking(random_password()).await?;
        let mut user = UserAccount {
            id: UserId::new(),
            is_admin: self.settings.is_admin_email(&identity.email),
            username,
            phone_number: String::new(),
            email: identity.email,
            password_hash: password_hash.clone(),
            old_password_hashes: vec![password_hash],
            is_verified: true,
            login_attempts: 0,
            lock_until: None,
            password_expires_at: now + self.settings.password_max_age,
            otp: None,
            reset_otp: None,
            login_devices: Vec::new(),
            remembered_devices: Vec::new(),
            auth_provider: AuthProvider::Google,
            created_at: now,
        };
        user.record_login_device(&client.device);
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "user created from google sign-in");
        self.activity
            .info("User registered with Google", user.id.to_string())
            .await;
        Ok(GoogleSession {
            session: self.start_session(&user, &client.device, now)?,
            created: true,
        })
    }

    pub async fn google_account(&self, id_token: &str) -> Result<UserProfile, ServiceError> {
        let identity = self.verify_google(id_token).await?;
        self.store
            .find_user_by_email(&identity.email)
            .await?
            .map(|user| user.profile(""))
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    async fn verify_google(
        &self,
        id_token: &str,
    ) -> Result<external_services::GoogleIdentity, ServiceError> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(ServiceError::bad_request("Please provide a Google token"));
        }
        match self.google.verify_id_token(id_token).await {
            Ok(identity) => Ok(identity),
            Err(IntegrationError::Rejected(reason)) => {
                warn!(%reason, "google token rejected");
                Err(ServiceError::Unauthorized("Invalid Google token".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Checks the code against the stored challenge, then redeems it with a
    /// compare-and-set so parallel requests cannot both use it.
    async fn redeem_otp(
        &self,
        email: &str,
        otp: &str,
        purpose: OtpPurpose,
        device: &str,
    ) -> Result<UserAccount, ServiceError> {
        let email = email.trim();
        if !all_present(&[email, otp]) {
            return Err(ServiceError::bad_request("Please enter all fields"));
        }
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::bad_request("User not found"))?;
        verify_challenge(user.otp.as_ref(), purpose, otp, Utc::now())?;
        self.store
            .redeem_otp(user.id, purpose, &hash_otp(otp), device)
            .await?
            .ok_or_else(|| ServiceError::bad_request("Invalid OTP"))
    }

    async fn load_user(&self, id: UserId) -> Result<UserAccount, ServiceError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    fn start_session(
        &self,
        user: &UserAccount,
        device: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, ServiceError> {
        let token = self.jwt.issue(user.id, user.is_admin, now)?;
        Ok(Session {
            token,
            profile: user.profile(device),
        })
    }

    async fn send_otp(
        &self,
        to: &str,
        code: String,
        kind: OtpEmailKind,
    ) -> Result<(), IntegrationError> {
        let email = OtpEmail {
            to: to.to_string(),
            code,
            kind,
            valid_minutes: self.settings.otp_ttl.num_minutes(),
        };
        self.mailer.send_otp(&email).await.inspect_err(|err| {
            warn!(error = %err, kind = ?kind, "otp email failed");
        })
    }
}

fn all_present(values: &[&str]) -> bool {
    values.iter().all(|value| !value.trim().is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn display_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GOOGLE_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| ServiceError::internal("password hashing task failed", err))?
        .map_err(ServiceError::from)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| ServiceError::internal("password verification task failed", err))?
        .map_err(ServiceError::from)
}

async fn history_blocking(password: String, hashes: Vec<String>) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || password_in_history(&password, &hashes))
        .await
        .map_err(|err| ServiceError::internal("password history task failed", err))
}
