use std::sync::Arc;

use account_auth::JwtIssuer;
use audit_store::InMemoryAuditRepository;
use booking_service::{
    AccountSettings, Actor, MovieInput, PaymentSettings, ServiceDeps, Services, ShowInput,
};
use chrono::{Duration, Utc};
use external_services::{
    FakePaymentGateway, RecordingMailer, StaticCaptchaVerifier, StaticGoogleVerifier,
};
use ticket_domain::{Seat, Show, UserId};
use ticket_store::InMemoryTicketStore;

use crate::{AppState, HttpSettings, RequestMeta};

pub const PASSWORD: &str = "Orange#Rocket42";
pub const ADMIN_EMAIL: &str = "admin@cinema.test";

pub struct Harness {
    pub state: AppState,
    pub store: InMemoryTicketStore,
    pub audit: InMemoryAuditRepository,
    pub mailer: RecordingMailer,
    pub gateway: FakePaymentGateway,
}

pub fn harness() -> Harness {
    harness_with(StaticGoogleVerifier::default())
}

pub fn harness_with(google: StaticGoogleVerifier) -> Harness {
    let store = InMemoryTicketStore::new();
    let audit = InMemoryAuditRepository::default();
    let mailer = RecordingMailer::new();
    let gateway = FakePaymentGateway::new();
    let jwt = JwtIssuer::new("api-http-tests", Duration::hours(1)).expect("jwt");

    let services = Services::new(ServiceDeps {
        store: Arc::new(store.clone()),
        activity_logs: Arc::new(audit.clone()),
        mailer: Arc::new(mailer.clone()),
        captcha: Arc::new(StaticCaptchaVerifier { accept: true }),
        google: Arc::new(google),
        payment_gateway: Arc::new(gateway.clone()),
        jwt: Arc::new(jwt),
        accounts: AccountSettings {
            admin_emails: vec![ADMIN_EMAIL.to_string()],
            ..AccountSettings::default()
        },
        payments: PaymentSettings {
            return_url: "http://localhost:3000/payment/success".to_string(),
        },
    });
    let state = AppState::new(
        Arc::new(services),
        HttpSettings {
            cookie_secure: true,
            cors_origins: vec!["http://localhost:3000".to_string()],
        },
    );
    Harness {
        state,
        store,
        audit,
        mailer,
        gateway,
    }
}

pub fn token_for(state: &AppState, user: UserId, is_admin: bool) -> String {
    state
        .services
        .accounts
        .jwt()
        .issue(user, is_admin, Utc::now())
        .expect("issue")
        .token
}

pub fn meta() -> RequestMeta {
    RequestMeta {
        method: "POST".to_string(),
        url: "/api/test".to_string(),
        ip: Some("127.0.0.1".to_string()),
        device: "Mozilla/5.0 (test)".to_string(),
    }
}

pub fn movie_input(name: &str) -> MovieInput {
    MovieInput {
        movie_name: name.to_string(),
        movie_genre: "Drama".to_string(),
        movie_details: "Two friends cross the valley.".to_string(),
        movie_rated: "PG".to_string(),
        movie_duration: "2h 5m".to_string(),
        movie_poster_image: "poster.jpg".to_string(),
    }
}

/// One movie with a single show of `seat_count` seats priced at `price`.
pub async fn seeded_show(h: &Harness, price: u64, seat_count: u32) -> (Show, Vec<Seat>) {
    let admin = Actor::admin(UserId::new());
    let catalog = &h.state.services.catalog;
    let movie = catalog
        .create_movie(&admin, movie_input("Kabaddi"))
        .await
        .expect("movie");
    let created = catalog
        .create_show(
            &admin,
            ShowInput {
                movie_id: movie.id,
                show_date: "2026-12-01".to_string(),
                show_time: "19:00".to_string(),
                price,
                seat_rows: Some(1),
                seats_per_row: Some(seat_count),
            },
        )
        .await
        .expect("show");
    (created.show, created.seats)
}
