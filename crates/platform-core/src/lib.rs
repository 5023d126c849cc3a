use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnv {
    Local,
    Dev,
    Test,
    Prod,
}

impl AppEnv {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }
}

impl std::str::FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(ConfigError::InvalidEnv(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app: AppSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub integrations: IntegrationsSection,
    pub observability: ObservabilitySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    pub env: AppEnv,
    pub service_name: String,
    pub http_bind_addr: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub max_login_attempts: u32,
    pub lockout_secs: i64,
    pub password_max_age_days: i64,
    pub password_history: usize,
    pub require_captcha: bool,
    pub cookie_secure: bool,
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsSection {
    pub mail_smtp_host: String,
    pub mail_user: Option<String>,
    pub mail_password: Option<String>,
    pub mail_sender_name: String,
    pub recaptcha_secret: Option<String>,
    pub google_client_id: Option<String>,
    pub khalti_secret_key: Option<String>,
    pub khalti_base_url: String,
    pub khalti_return_url: String,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySection {
    pub log_filter: String,
}

/// JSON body shared by every HTTP response: `success` and `message` plus the
/// payload's own fields at the top level.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code),
            data: None,
        }
    }

    #[must_use]
    pub fn err_with(code: ErrorCode, message: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code),
            data: Some(data),
        }
    }
}

impl ResponseEnvelope<()> {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RequestInvalid,
    WeakPassword,
    Unauthorized,
    Forbidden,
    AccountLocked,
    NotFound,
    Conflict,
    SeatsUnavailable,
    UpstreamFailed,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestInvalid => "REQUEST_INVALID",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::SeatsUnavailable => "SEATS_UNAVAILABLE",
            Self::UpstreamFailed => "UPSTREAM_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid APP_ENV value: {0}")]
    InvalidEnv(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unable to locate config directory (expected config/default.toml)")]
    ConfigDirNotFound,
    #[error("failed reading config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing config file {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct PartialAppConfig {
    app: Option<PartialAppSection>,
    database: Option<PartialDatabaseSection>,
    auth: Option<PartialAuthSection>,
    integrations: Option<PartialIntegrationsSection>,
    observability: Option<PartialObservabilitySection>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialAppSection {
    env: Option<AppEnv>,
    service_name: Option<String>,
    http_bind_addr: Option<String>,
    cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialDatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialAuthSection {
    jwt_secret: Option<String>,
    jwt_ttl_secs: Option<i64>,
    otp_ttl_secs: Option<i64>,
    max_login_attempts: Option<u32>,
    lockout_secs: Option<i64>,
    password_max_age_days: Option<i64>,
    password_history: Option<usize>,
    require_captcha: Option<bool>,
    cookie_secure: Option<bool>,
    admin_emails: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialIntegrationsSection {
    mail_smtp_host: Option<String>,
    mail_user: Option<String>,
    mail_password: Option<String>,
    mail_sender_name: Option<String>,
    recaptcha_secret: Option<String>,
    google_client_id: Option<String>,
    khalti_secret_key: Option<String>,
    khalti_base_url: Option<String>,
    khalti_return_url: Option<String>,
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialObservabilitySection {
    log_filter: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = env::var("APP_ENV")
            .ok()
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(AppEnv::Local);
        let config_dir = resolve_config_dir()?;
        Self::load_from_dir_for_env(config_dir, app_env)
    }

    pub fn load_from_dir_for_env(
        config_dir: impl AsRef<Path>,
        app_env: AppEnv,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let mut config = Self::default_for_env(app_env);
        merge_file(&mut config, &config_dir.join("default.toml"))?;
        let env_file = config_dir.join(format!("{}.toml", app_env.as_str()));
        if env_file.exists() {
            merge_file(&mut config, &env_file)?;
        }
        config.app.env = app_env;
        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    #[must_use]
    pub fn default_for_env(app_env: AppEnv) -> Self {
        Self {
            app: AppSection {
                env: app_env,
                service_name: "movie-tickets".to_string(),
                http_bind_addr: "127.0.0.1:5000".to_string(),
                cors_origins: vec!["http://localhost:3000".to_string()],
            },
            database: DatabaseSection {
                url: None,
                max_connections: 10,
            },
            auth: AuthSection {
                jwt_secret: String::new(),
                jwt_ttl_secs: 3600,
                otp_ttl_secs: 600,
                max_login_attempts: 5,
                lockout_secs: 900,
                password_max_age_days: 90,
                password_history: 5,
                require_captcha: true,
                cookie_secure: true,
                admin_emails: Vec::new(),
            },
            integrations: IntegrationsSection {
                mail_smtp_host: "smtp.gmail.com".to_string(),
                mail_user: None,
                mail_password: None,
                mail_sender_name: "Movie Tickets".to_string(),
                recaptcha_secret: None,
                google_client_id: None,
                khalti_secret_key: None,
                khalti_base_url: "https://dev.khalti.com/api/v2".to_string(),
                khalti_return_url: "http://localhost:3000/payment/success".to_string(),
                http_timeout_secs: 10,
            },
            observability: ObservabilitySection {
                log_filter: "info".to_string(),
            },
        }
    }

    /// Applies `MOVIE_TICKETS__*` overrides plus the plain names deployments
    /// already export (`PORT`, `DATABASE_URL`, `JWT_SECRET`, ...).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw_env) = lookup("APP_ENV") {
            self.app.env = raw_env.parse()?;
        }
        if let Some(value) = lookup("MOVIE_TICKETS__SERVICE_NAME") {
            self.app.service_name = value;
        }
        if let Some(port) = lookup("PORT") {
            let port: u16 = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
            self.app.http_bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(value) = lookup("MOVIE_TICKETS__HTTP_BIND_ADDR") {
            self.app.http_bind_addr = value;
        }
        if let Some(value) = lookup("MOVIE_TICKETS__CORS_ORIGINS") {
            self.app.cors_origins = split_list(&value);
        }
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Some(value) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = value;
        }
        if let Some(value) = lookup("JWT_EXPIRY_SECS") {
            self.auth.jwt_ttl_secs = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "JWT_EXPIRY_SECS",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("MOVIE_TICKETS__ADMIN_EMAILS") {
            self.auth.admin_emails = split_list(&value);
        }
        if let Some(value) = lookup("MOVIE_TICKETS__REQUIRE_CAPTCHA") {
            self.auth.require_captcha = parse_bool("MOVIE_TICKETS__REQUIRE_CAPTCHA", &value)?;
        }
        if let Some(value) = lookup("EMAIL_USER") {
            self.integrations.mail_user = Some(value);
        }
        if let Some(value) = lookup("EMAIL_PASS") {
            self.integrations.mail_password = Some(value);
        }
        if let Some(value) = lookup("RECAPTCHA_SECRET_KEY") {
            self.integrations.recaptcha_secret = Some(value);
        }
        if let Some(value) = lookup("GOOGLE_CLIENT_ID") {
            self.integrations.google_client_id = Some(value);
        }
        if let Some(value) = lookup("KHALTI_SECRET_KEY") {
            self.integrations.khalti_secret_key = Some(value);
        }
        if let Some(log_filter) = lookup("OBSERVABILITY__LOG_FILTER") {
            self.observability.log_filter = log_filter;
        } else if let Some(log_filter) = lookup("RUST_LOG") {
            self.observability.log_filter = log_filter;
        }
        Ok(())
    }

    fn merge_partial(&mut self, partial: PartialAppConfig) {
        if let Some(app) = partial.app {
            if let Some(value) = app.env {
                self.app.env = value;
            }
            if let Some(value) = app.service_name {
                self.app.service_name = value;
            }
            if let Some(value) = app.http_bind_addr {
                self.app.http_bind_addr = value;
            }
            if let Some(value) = app.cors_origins {
                self.app.cors_origins = value;
            }
        }
        if let Some(database) = partial.database {
            if database.url.is_some() {
                self.database.url = database.url;
            }
            if let Some(value) = database.max_connections {
                self.database.max_connections = value;
            }
        }
        if let Some(auth) = partial.auth {
            if let Some(value) = auth.jwt_secret {
                self.auth.jwt_secret = value;
            }
            if let Some(value) = auth.jwt_ttl_secs {
                self.auth.jwt_ttl_secs = value;
            }
            if let Some(value) = auth.otp_ttl_secs {
                self.auth.otp_ttl_secs = value;
            }
            if let Some(value) = auth.max_login_attempts {
                self.auth.max_login_attempts = value;
            }
            if let Some(value) = auth.lockout_secs {
                self.auth.lockout_secs = value;
            }
            if let Some(value) = auth.password_max_age_days {
                self.auth.password_max_age_days = value;
            }
            if let Some(value) = auth.password_history {
                self.auth.password_history = value;
            }
            if let Some(value) = auth.require_captcha {
                self.auth.require_captcha = value;
            }
            if let Some(value) = auth.cookie_secure {
                self.auth.cookie_secure = value;
            }
            if let Some(value) = auth.admin_emails {
                self.auth.admin_emails = value;
            }
        }
        if let Some(integrations) = partial.integrations {
            if let Some(value) = integrations.mail_smtp_host {
                self.integrations.mail_smtp_host = value;
            }
            if integrations.mail_user.is_some() {
                self.integrations.mail_user = integrations.mail_user;
            }
            if integrations.mail_password.is_some() {
                self.integrations.mail_password = integrations.mail_password;
            }
            if let Some(value) = integrations.mail_sender_name {
                self.integrations.mail_sender_name = value;
            }
            if integrations.recaptcha_secret.is_some() {
                self.integrations.recaptcha_secret = integrations.recaptcha_secret;
            }
            if integrations.google_client_id.is_some() {
                self.integrations.google_client_id = integrations.google_client_id;
            }
            if integrations.khalti_secret_key.is_some() {
                self.integrations.khalti_secret_key = integrations.khalti_secret_key;
            }
            if let Some(value) = integrations.khalti_base_url {
                self.integrations.khalti_base_url = value;
            }
            if let Some(value) = integrations.khalti_return_url {
                self.integrations.khalti_return_url = value;
            }
            if let Some(value) = integrations.http_timeout_secs {
                self.integrations.http_timeout_secs = value;
            }
        }
        if let Some(observability) = partial.observability {
            if let Some(value) = observability.log_filter {
                self.observability.log_filter = value;
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn merge_file(config: &mut AppConfig, path: &Path) -> Result<(), ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let partial =
        toml::from_str::<PartialAppConfig>(&content).map_err(|source| ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        })?;
    config.merge_partial(partial);
    Ok(())
}

fn resolve_config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var("MOVIE_TICKETS_CONFIG_DIR") {
        return Ok(PathBuf::from(path));
    }

    let mut current_dir = env::current_dir().map_err(|_| ConfigError::ConfigDirNotFound)?;
    loop {
        let candidate = current_dir.join("config");
        if candidate.join("default.toml").exists() {
            return Ok(candidate);
        }
        if !current_dir.pop() {
            break;
        }
    }

    Err(ConfigError::ConfigDirNotFound)
}
