use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use booking_service::{BookingDetails, KhaltiCallback, KhaltiCheckout, NewBooking, ServiceError};
use platform_core::ResponseEnvelope;
use serde::{Deserialize, Serialize};
use ticket_domain::{Booking, BookingId, BookingStatus, Payment, SeatId};
use tracing::info;

use crate::{AdminUser, ApiError, ApiResult, AppState, AuthUser, JsonBody, ok, parse_id};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookingRequest {
    pub show: String,
    pub seats: Vec<String>,
    pub price: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusRequest {
    pub status: String,
}

/// `itemId` is the booking being paid for; `totalPrice` is in paisa.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KhaltiInitRequest {
    #[serde(rename = "itemId")]
    pub item_id: String,
    #[serde(rename = "totalPrice")]
    pub total_price: u64,
    pub website_url: String,
}

/// Query string Khalti appends to the return URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KhaltiReturnQuery {
    pub pidx: Option<String>,
    pub purchase_order_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingCreatedPayload {
    pub id: BookingId,
    pub booking: Booking,
}

/// The original client reads the caller's bookings from a `movies` key.
#[derive(Debug, Clone, Serialize)]
pub struct BookedMoviesPayload {
    pub movies: Vec<BookingDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketsPayload {
    pub tickets: Vec<BookingDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingsPayload {
    pub bookings: Vec<BookingDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetailsPayload {
    pub booking: BookingDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPayload {
    pub booking: Booking,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSessionPayload {
    pub payment_url: String,
    pub pidx: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPayload {
    pub payment: Payment,
}

pub async fn create_booking(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    JsonBody(body): JsonBody<BookingRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<BookingCreatedPayload>>), ApiError> {
    info!(route = "/api/booking/create", seats = body.seats.len(), "api http request");
    let seat_ids = body
        .seats
        .iter()
        .map(|id| parse_id::<SeatId>(id, "seat"))
        .collect::<Result<Vec<_>, _>>()?;
    let booking = state
        .services
        .bookings
        .create_booking(
            &actor,
            NewBooking {
                show_id: parse_id(&body.show, "show")?,
                seat_ids,
                price: body.price,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ok(
            "Booking added successfully",
            BookingCreatedPayload {
                id: booking.id,
                booking,
            },
        ),
    ))
}

pub async fn get_booking(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<BookedMoviesPayload> {
    info!(route = "/api/booking/get_booking", "api http request");
    let movies = state.services.bookings.list_my_bookings(&actor).await?;
    Ok(ok(
        "Booked tickets fetched successfully",
        BookedMoviesPayload { movies },
    ))
}

pub async fn get_bookings_by_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<TicketsPayload> {
    info!(route = "/api/booking/get_bookings_by_user", "api http request");
    let tickets = state.services.bookings.list_my_bookings(&actor).await?;
    Ok(ok(
        "Booked tickets fetched successfully",
        TicketsPayload { tickets },
    ))
}

pub async fn get_all_bookings(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> ApiResult<BookingsPayload> {
    info!(route = "/api/booking/get_all_bookings", "api http request");
    let bookings = state.services.bookings.list_all_bookings(&actor).await?;
    Ok(ok(
        "Booked tickets fetched successfully",
        BookingsPayload { bookings },
    ))
}

pub async fn get_booking_by_id(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<BookingDetailsPayload> {
    info!(route = "/api/booking/get_by_id/{id}", booking_id = %id, "api http request");
    let booking = state
        .services
        .bookings
        .get_booking(&actor, parse_id(&id, "booking")?)
        .await?;
    Ok(ok(
        "Booking fetched successfully",
        BookingDetailsPayload { booking },
    ))
}

pub async fn change_status(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> ApiResult<BookingPayload> {
    info!(route = "/api/booking/change_status/{id}", booking_id = %id, status = %body.status, "api http request");
    let next = body
        .status
        .parse::<BookingStatus>()
        .map_err(ServiceError::from)?;
    let booking = state
        .services
        .bookings
        .change_status(&actor, parse_id(&id, "booking")?, next)
        .await?;
    Ok(ok(
        "Booking status changed successfully",
        BookingPayload { booking },
    ))
}

pub async fn initialize_khalti(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    JsonBody(body): JsonBody<KhaltiInitRequest>,
) -> ApiResult<PaymentSessionPayload> {
    info!(route = "/api/payment/initialize_khalti", item_id = %body.item_id, "api http request");
    let session = state
        .services
        .payments
        .initialize(
            &actor,
            KhaltiCheckout {
                booking_id: parse_id(&body.item_id, "booking")?,
                total_price: body.total_price,
                website_url: body.website_url,
            },
        )
        .await?;
    Ok(ok(
        "Khalti payment initialized",
        PaymentSessionPayload {
            payment_url: session.payment_url,
            pidx: session.pidx,
        },
    ))
}

pub async fn complete_khalti_payment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<KhaltiReturnQuery>,
) -> ApiResult<PaymentPayload> {
    info!(route = "/api/payment/complete-khalti-payment", pidx = ?query.pidx, "api http request");
    let payment = state
        .services
        .payments
        .complete(
            &actor,
            KhaltiCallback {
                pidx: query.pidx.unwrap_or_default(),
                purchase_order_id: query.purchase_order_id,
                status: query.status,
            },
        )
        .await?;
    Ok(ok("Payment successful", PaymentPayload { payment }))
}
