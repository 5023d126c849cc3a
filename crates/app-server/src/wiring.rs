use std::sync::Arc;
use std::time::Duration as StdDuration;

use account_auth::JwtIssuer;
use anyhow::{Context, Result, bail};
use api_http::HttpSettings;
use audit_store::{ActivityLogRepository, InMemoryAuditRepository, PostgresAuditRepository};
use booking_service::{AccountSettings, PaymentSettings, ServiceDeps, Services};
use chrono::Duration;
use external_services::{
    CaptchaVerifier, FakePaymentGateway, GoogleIdentityVerifier, GoogleTokenInfoVerifier,
    KhaltiGateway, OtpMailer, PaymentGateway, RecaptchaVerifier, RecordingMailer, SmtpMailer,
    StaticCaptchaVerifier, StaticGoogleVerifier, http_client,
};
use platform_core::{AppConfig, AppEnv, DatabaseSection};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use ticket_store::{InMemoryTicketStore, PostgresTicketStore, TicketStore};
use tracing::{info, warn};

pub struct Storage {
    pub store: Arc<dyn TicketStore>,
    pub activity_logs: Arc<dyn ActivityLogRepository>,
    pub backend: &'static str,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryTicketStore::new()),
            activity_logs: Arc::new(InMemoryAuditRepository::default()),
            backend: "memory",
        }
    }
}

/// Postgres with migrations applied when a URL is configured, memory
/// otherwise.
pub async fn open_storage(database: &DatabaseSection) -> Result<Storage> {
    let Some(url) = database.url.as_deref().filter(|url| !url.trim().is_empty()) else {
        warn!("no database url configured; data lives in memory and is lost on restart");
        return Ok(Storage::in_memory());
    };
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .connect(url)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("running database migrations")?;
    info!(max_connections = database.max_connections, "postgres storage ready");
    Ok(Storage {
        store: Arc::new(PostgresTicketStore::new(pool.clone())),
        activity_logs: Arc::new(PostgresAuditRepository::new(pool)),
        backend: "postgres",
    })
}

pub struct Integrations {
    pub mailer: Arc<dyn OtpMailer>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub google: Arc<dyn GoogleIdentityVerifier>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
}

fn configured(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Real HTTP clients where credentials are configured, local doubles
/// elsewhere. Production refuses to start on doubles.
pub fn integrations(config: &AppConfig) -> Result<Integrations> {
    let section = &config.integrations;
    let client = http_client(section.http_timeout_secs).context("building http client")?;
    let prod = config.app.env == AppEnv::Prod;
    let mut missing = Vec::new();

    let mailer: Arc<dyn OtpMailer> = match (
        configured(section.mail_user.as_deref()),
        configured(section.mail_password.as_deref()),
    ) {
        (Some(user), Some(password)) => Arc::new(
            SmtpMailer::new(
                &section.mail_smtp_host,
                user,
                SecretString::from(password.to_string()),
                &section.mail_sender_name,
                StdDuration::from_secs(section.http_timeout_secs.max(1)),
            )
            .context("building smtp mailer")?,
        ),
        _ => {
            missing.push("mail_user/mail_password");
            Arc::new(RecordingMailer::new())
        }
    };

    let captcha: Arc<dyn CaptchaVerifier> = match configured(section.recaptcha_secret.as_deref()) {
        Some(secret) => Arc::new(RecaptchaVerifier::new(client.clone(), secret)),
        None if config.auth.require_captcha => {
            missing.push("recaptcha_secret");
            Arc::new(StaticCaptchaVerifier { accept: true })
        }
        None => Arc::new(StaticCaptchaVerifier { accept: true }),
    };

    let google: Arc<dyn GoogleIdentityVerifier> =
        match configured(section.google_client_id.as_deref()) {
            Some(client_id) => Arc::new(GoogleTokenInfoVerifier::new(client.clone(), client_id)),
            None => {
                missing.push("google_client_id");
                Arc::new(StaticGoogleVerifier::default())
            }
        };

    let payment_gateway: Arc<dyn PaymentGateway> =
        match configured(section.khalti_secret_key.as_deref()) {
            Some(key) => Arc::new(KhaltiGateway::new(
                client,
                section.khalti_base_url.clone(),
                key,
            )),
            None => {
                missing.push("khalti_secret_key");
                Arc::new(FakePaymentGateway::new())
            }
        };

    if !missing.is_empty() {
        if prod {
            bail!("missing integration settings in prod: {}", missing.join(", "));
        }
        warn!(missing = ?missing, "using local integration doubles");
    }
    Ok(Integrations {
        mailer,
        captcha,
        google,
        payment_gateway,
    })
}

pub fn build_services(
    config: &AppConfig,
    storage: Storage,
    integrations: Integrations,
) -> Result<Services> {
    let jwt = JwtIssuer::new(
        config.auth.jwt_secret.clone(),
        Duration::seconds(config.auth.jwt_ttl_secs),
    )
    .context("jwt_secret must be set")?;
    Ok(Services::new(ServiceDeps {
        store: storage.store,
        activity_logs: storage.activity_logs,
        mailer: integrations.mailer,
        captcha: integrations.captcha,
        google: integrations.google,
        payment_gateway: integrations.payment_gateway,
        jwt: Arc::new(jwt),
        accounts: AccountSettings::from_auth_section(&config.auth),
        payments: PaymentSettings {
            return_url: config.integrations.khalti_return_url.clone(),
        },
    }))
}

#[must_use]
pub fn http_settings(config: &AppConfig) -> HttpSettings {
    HttpSettings {
        cookie_secure: config.auth.cookie_secure,
        cors_origins: config.app.cors_origins.clone(),
    }
}
