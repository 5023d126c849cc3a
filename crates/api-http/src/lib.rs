pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod error;
pub mod guard;
pub mod users;

#[cfg(test)]
mod test_support;

use std::{fmt, str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
    },
    middleware,
    routing::{delete, get, post, put},
};
use booking_service::Services;
use platform_core::ResponseEnvelope;
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

pub use error::{ApiError, ErrorDetails};
pub use guard::{AdminUser, AuthUser, RequestMeta};

pub type ApiResult<T> = Result<Json<ResponseEnvelope<T>>, ApiError>;

/// HTTP-only knobs that do not belong to any service.
#[derive(Debug, Clone, Default)]
pub struct HttpSettings {
    pub cookie_secure: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub http: Arc<HttpSettings>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("services", &"Services")
            .field("http", &self.http)
            .finish()
    }
}

impl AppState {
    #[must_use]
    pub fn new(services: Arc<Services>, http: HttpSettings) -> Self {
        Self {
            services,
            http: Arc::new(http),
        }
    }
}

pub(crate) fn ok<T>(message: &str, data: T) -> Json<ResponseEnvelope<T>> {
    Json(ResponseEnvelope::ok(message, data))
}

pub(crate) fn done(message: &str) -> Json<ResponseEnvelope<()>> {
    Json(ResponseEnvelope::message(message))
}

/// Parses a path or body id, answering 400 instead of the extractor's plain
/// text rejection.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what} id")))
}

/// `Json` whose rejections use the response envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub ok: bool,
}

pub async fn ping() -> Json<ResponseEnvelope<PingResponse>> {
    info!(route = "/test", "api http request");
    ok("Test API is working", PingResponse { ok: true })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "ignoring invalid cors origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/user/create", post(users::create_user))
        .route("/api/user/login", post(users::login_user))
        .route("/api/user/forgot-password", post(users::forgot_password))
        .route("/api/user/reset-password", post(users::reset_password))
        .route(
            "/api/user/verify_register_otp",
            put(users::verify_register_otp),
        )
        .route("/api/user/verify_login_otp", put(users::verify_login_otp))
        .route("/api/user/google_login", post(users::google_login))
        .route(
            "/api/user/get_user_by_google_email",
            post(users::get_user_by_google_email),
        )
        .route("/api/contact/create", post(admin::create_contact))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::public_guard,
        ))
}

fn guarded_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/get_all_users", get(users::get_all_users))
        .route("/api/user/get_single_profile", get(users::get_single_profile))
        .route("/api/user/update_profile", put(users::update_profile))
        .route("/api/user/delete", delete(users::delete_user))
        .route("/api/user/logout", post(users::logout_user))
        .route("/api/movie/create", post(catalog::create_movie))
        .route("/api/movie/delete_movie/{id}", delete(catalog::delete_movie))
        .route("/api/movie/update_movie/{id}", put(catalog::update_movie))
        .route("/api/shows/create", post(catalog::create_show))
        .route("/api/shows/{id}/update", put(catalog::update_show))
        .route("/api/shows/delete/{id}", delete(catalog::delete_show))
        .route("/api/seat/create", post(catalog::create_seats))
        .route("/api/seat/setavailable", put(catalog::set_available))
        .route("/api/booking/create", post(bookings::create_booking))
        .route("/api/booking/get_booking", get(bookings::get_booking))
        .route(
            "/api/booking/get_bookings_by_user",
            get(bookings::get_bookings_by_user),
        )
        .route(
            "/api/booking/get_all_bookings",
            get(bookings::get_all_bookings),
        )
        .route("/api/booking/get_by_id/{id}", get(bookings::get_booking_by_id))
        .route(
            "/api/booking/change_status/{id}",
            put(bookings::change_status),
        )
        .route(
            "/api/payment/initialize_khalti",
            post(bookings::initialize_khalti),
        )
        .route(
            "/api/payment/complete-khalti-payment",
            get(bookings::complete_khalti_payment),
        )
        .route("/api/admin/dashboard_stats", get(admin::dashboard_stats))
        .route("/api/admin/logs", get(admin::get_logs))
        .route("/api/contact/get_contact", get(admin::get_contacts))
}

fn open_routes() -> Router<AppState> {
    Router::new()
        .route("/test", get(ping))
        .route("/api/movie/get_all_movies", get(catalog::get_all_movies))
        .route(
            "/api/movie/get_single_movie/{id}",
            get(catalog::get_single_movie),
        )
        .route("/api/movie/pagination", get(catalog::paginate_movies))
        .route("/api/movie/get_movies_count", get(catalog::get_movies_count))
        .route("/api/shows/get_all", get(catalog::get_all_shows))
        .route("/api/shows/get_by_movie/{id}", get(catalog::get_shows_by_movie))
        .route("/api/shows/get_by_id/{id}", get(catalog::get_show_by_id))
        .route(
            "/api/seat/get_seats_by_show/{id}",
            get(catalog::get_seats_by_show),
        )
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.http.cors_origins);
    Router::new()
        .merge(open_routes())
        .merge(public_routes(&state))
        .merge(guarded_routes())
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
