pub mod accounts;
pub mod activity;
pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod context;
pub mod error;
pub mod payments;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use account_auth::JwtIssuer;
use audit_store::ActivityLogRepository;
use external_services::{CaptchaVerifier, GoogleIdentityVerifier, OtpMailer, PaymentGateway};
use ticket_store::TicketStore;

pub use accounts::{
    AccountService, AccountSettings, GoogleSession, LoginAttempt, LoginOutcome, ProfileUpdate,
    Registration, Session,
};
pub use activity::ActivityRecorder;
pub use admin::{AdminService, ContactInput, DashboardStats, LogPage};
pub use bookings::{BookingCustomer, BookingDetails, BookingService, NewBooking, ShowDetails};
pub use catalog::{
    CatalogService, CreatedShow, MAX_PAGE_LIMIT, MovieInput, MoviePage, MovieUpdate, ShowInput,
    ShowUpdate,
};
pub use context::{Actor, ClientInfo};
pub use error::{ADMIN_REQUIRED, ServiceError};
pub use payments::{KhaltiCallback, KhaltiCheckout, PaymentService, PaymentSettings};

/// Storage, integrations and settings the services are built from.
pub struct ServiceDeps {
    pub store: Arc<dyn TicketStore>,
    pub activity_logs: Arc<dyn ActivityLogRepository>,
    pub mailer: Arc<dyn OtpMailer>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub google: Arc<dyn GoogleIdentityVerifier>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub jwt: Arc<JwtIssuer>,
    pub accounts: AccountSettings,
    pub payments: PaymentSettings,
}

pub struct Services {
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub bookings: BookingService,
    pub payments: PaymentService,
    pub admin: AdminService,
    pub activity: ActivityRecorder,
}

impl Services {
    #[must_use]
    pub fn new(deps: ServiceDeps) -> Self {
        let activity = ActivityRecorder::new(Arc::clone(&deps.activity_logs));
        Self {
            accounts: AccountService::new(
                Arc::clone(&deps.store),
                deps.mailer,
                deps.captcha,
                deps.google,
                deps.jwt,
                activity.clone(),
                deps.accounts,
            ),
            catalog: CatalogService::new(Arc::clone(&deps.store)),
            bookings: BookingService::new(Arc::clone(&deps.store)),
            payments: PaymentService::new(
                Arc::clone(&deps.store),
                deps.payment_gateway,
                deps.payments,
            ),
            admin: AdminService::new(deps.store, deps.activity_logs),
            activity,
        }
    }
}
