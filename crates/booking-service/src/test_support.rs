use std::sync::Arc;

use account_auth::JwtIssuer;
use audit_store::InMemoryAuditRepository;
use chrono::Duration;
use external_services::{
    FakePaymentGateway, RecordingMailer, StaticCaptchaVerifier, StaticGoogleVerifier,
};
use ticket_domain::{Seat, Show, UserId};
use ticket_store::InMemoryTicketStore;

use crate::{
    AccountSettings, Actor, MovieInput, PaymentSettings, ServiceDeps, Services, ShowInput,
};

pub const PASSWORD: &str = "Orange#Rocket42";

pub struct FixtureOptions {
    pub mailer_fails: bool,
    pub captcha_accepts: bool,
    pub google: StaticGoogleVerifier,
    pub settings: AccountSettings,
}

pub struct Fixture {
    pub services: Arc<Services>,
    pub store: InMemoryTicketStore,
    pub audit: InMemoryAuditRepository,
    pub mailer: RecordingMailer,
    pub gateway: FakePaymentGateway,
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {})
}

pub fn fixture_with(configure: impl FnOnce(&mut FixtureOptions)) -> Fixture {
    let mut options = FixtureOptions {
        mailer_fails: false,
        captcha_accepts: true,
        google: StaticGoogleVerifier::default(),
        settings: AccountSettings::default(),
    };
    configure(&mut options);

    let store = InMemoryTicketStore::new();
    let audit = InMemoryAuditRepository::default();
    let mailer = if options.mailer_fails {
        RecordingMailer::failing()
    } else {
        RecordingMailer::new()
    };
    let gateway = FakePaymentGateway::new();
    let jwt = JwtIssuer::new("booking-service-tests", Duration::hours(1)).expect("jwt");

    let services = Services::new(ServiceDeps {
        store: Arc::new(store.clone()),
        activity_logs: Arc::new(audit.clone()),
        mailer: Arc::new(mailer.clone()),
        captcha: Arc::new(StaticCaptchaVerifier {
            accept: options.captcha_accepts,
        }),
        google: Arc::new(options.google),
        payment_gateway: Arc::new(gateway.clone()),
        jwt: Arc::new(jwt),
        accounts: options.settings,
        payments: PaymentSettings {
            return_url: "http://localhost:3000/payment/success".to_string(),
        },
    });
    Fixture {
        services: Arc::new(services),
        store,
        audit,
        mailer,
        gateway,
    }
}

pub fn movie_input(name: &str) -> MovieInput {
    MovieInput {
        movie_name: name.to_string(),
        movie_genre: "Drama".to_string(),
        movie_details: "A road trip across the hills.".to_string(),
        movie_rated: "PG".to_string(),
        movie_duration: "2h 10m".to_string(),
        movie_poster_image: "jatra.jpg".to_string(),
    }
}

/// A movie named "Jatra" with one show of `seat_count` seats in row A.
pub async fn seeded_show(fx: &Fixture, price: u64, seat_count: u32) -> (Show, Vec<Seat>) {
    let admin = Actor::admin(UserId::new());
    let movie = fx
        .services
        .catalog
        .create_movie(&admin, movie_input("Jatra"))
        .await
        .expect("movie");
    let created = fx
        .services
        .catalog
        .create_show(
            &admin,
            ShowInput {
                movie_id: movie.id,
                show_date: "2026-11-02".to_string(),
                show_time: "18:30".to_string(),
                price,
                seat_rows: Some(1),
                seats_per_row: Some(seat_count),
            },
        )
        .await
        .expect("show");
    (created.show, created.seats)
}
