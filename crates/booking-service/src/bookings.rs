use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use ticket_domain::{
    Booking, BookingId, BookingStatus, Movie, MovieId, Rupees, Seat, SeatId, Show, ShowId,
    UserAccount, UserId,
};
use ticket_store::{StoreError, TicketStore};
use tracing::info;

use crate::context::Actor;
use crate::error::ServiceError;

/// Booking with its show, movie, seats and customer filled in, in the shape
/// the booking pages render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(rename = "_id")]
    pub id: BookingId,
    pub user: Option<BookingCustomer>,
    pub show: Option<ShowDetails>,
    pub seats: Vec<Seat>,
    pub price: Rupees,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCustomer {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone_number: String,
}

impl From<&UserAccount> for BookingCustomer {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

/// `movieId` carries the whole movie, or null once the movie is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowDetails {
    #[serde(rename = "_id")]
    pub id: ShowId,
    pub movie_id: Option<Movie>,
    pub show_date: String,
    pub show_time: String,
    pub show_price: Rupees,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub show_id: ShowId,
    pub seat_ids: Vec<SeatId>,
    /// Total the client expects to pay, if it sent one.
    pub price: Option<u64>,
}

pub struct BookingService {
    store: Arc<dyn TicketStore>,
}

impl BookingService {
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Prices the booking from the show and reserves every seat or none.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        request: NewBooking,
    ) -> Result<Booking, ServiceError> {
        if request.seat_ids.is_empty() {
            return Err(ServiceError::bad_request("Please select at least one seat"));
        }
        let mut seen = HashSet::new();
        if !request.seat_ids.iter().all(|id| seen.insert(*id)) {
            return Err(ServiceError::bad_request("Duplicate seats in request"));
        }
        let show = self
            .store
            .get_show(request.show_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Show not found"))?;
        let total = show
            .show_price
            .checked_mul(request.seat_ids.len() as u64)?;
        if let Some(claimed) = request.price {
            if claimed != total.as_u64() {
                return Err(ServiceError::bad_request(format!(
                    "Price mismatch: expected {}",
                    total.as_u64()
                )));
            }
        }

        let now = Utc::now();
        let booking = Booking {
            id: BookingId::new(),
            user_id: actor.user_id,
            show_id: show.id,
            seats: request.seat_ids,
            price: total,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.reserve_and_insert_booking(&booking).await?;
        info!(
            booking_id = %booking.id,
            show_id = %booking.show_id,
            seats = booking.seats.len(),
            price = booking.price.as_u64(),
            "booking created"
        );
        Ok(booking)
    }

    pub async fn list_my_bookings(
        &self,
        actor: &Actor,
    ) -> Result<Vec<BookingDetails>, ServiceError> {
        let bookings = self.store.list_bookings_by_user(actor.user_id).await?;
        self.details(bookings).await
    }

    pub async fn list_all_bookings(
        &self,
        actor: &Actor,
    ) -> Result<Vec<BookingDetails>, ServiceError> {
        actor.require_admin()?;
        let bookings = self.store.list_bookings().await?;
        self.details(bookings).await
    }

    pub async fn get_booking(
        &self,
        actor: &Actor,
        id: BookingId,
    ) -> Result<BookingDetails, ServiceError> {
        let booking = self.load(id).await?;
        actor.require_owner_or_admin(booking.user_id)?;
        let mut details = self.details(vec![booking]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::not_found("Booking not found"))
    }

    /// Owners may only cancel. Cancelling releases the seats.
    pub async fn change_status(
        &self,
        actor: &Actor,
        id: BookingId,
        next: BookingStatus,
    ) -> Result<Booking, ServiceError> {
        let booking = self.load(id).await?;
        actor.require_owner_or_admin(booking.user_id)?;
        if !actor.is_admin && next != BookingStatus::Cancelled {
            return Err(ServiceError::forbidden(
                "Only administrators can change a booking to this status",
            ));
        }
        booking.status.transition_to(next)?;

        let result = if next == BookingStatus::Cancelled {
            self.store.cancel_booking(id, booking.status).await
        } else {
            self.store
                .update_booking_status(id, booking.status, next)
                .await
        };
        let updated = match result {
            Ok(updated) => updated,
            Err(StoreError::StatusMismatch { .. }) => {
                return Err(ServiceError::Conflict(
                    "Booking was modified by another request, please retry".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            booking_id = %id,
            from = booking.status.as_str(),
            to = next.as_str(),
            by = %actor.user_id,
            "booking status changed"
        );
        Ok(updated)
    }

    async fn load(&self, id: BookingId) -> Result<Booking, ServiceError> {
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking not found"))
    }

    /// Shows, movies and users may have been deleted since booking; those
    /// references come back empty instead of failing the listing.
    async fn details(&self, bookings: Vec<Booking>) -> Result<Vec<BookingDetails>, ServiceError> {
        let mut shows: HashMap<ShowId, Option<Show>> = HashMap::new();
        let mut movies: HashMap<MovieId, Option<Movie>> = HashMap::new();
        let mut users: HashMap<UserId, Option<BookingCustomer>> = HashMap::new();
        let mut out = Vec::with_capacity(bookings.len());

        for booking in bookings {
            if !shows.contains_key(&booking.show_id) {
                let show = self.store.get_show(booking.show_id).await?;
                shows.insert(booking.show_id, show);
            }
            let show = shows.get(&booking.show_id).cloned().flatten();

            let show = match show {
                Some(show) => {
                    if !movies.contains_key(&show.movie_id) {
                        let movie = self.store.get_movie(show.movie_id).await?;
                        movies.insert(show.movie_id, movie);
                    }
                    Some(ShowDetails {
                        id: show.id,
                        movie_id: movies.get(&show.movie_id).cloned().flatten(),
                        show_date: show.show_date,
                        show_time: show.show_time,
                        show_price: show.show_price,
                    })
                }
                None => None,
            };

            if !users.contains_key(&booking.user_id) {
                let user = self.store.get_user(booking.user_id).await?;
                users.insert(booking.user_id, user.as_ref().map(BookingCustomer::from));
            }
            let seats = self.store.get_seats(&booking.seats).await?;

            out.push(BookingDetails {
                id: booking.id,
                user: users.get(&booking.user_id).cloned().flatten(),
                show,
                seats,
                price: booking.price,
                status: booking.status,
                created_at: booking.created_at,
                updated_at: booking.updated_at,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use ticket_store::{BookingRepository, SeatRepository, ShowRepository};

    use super::*;
    use crate::test_support::{Fixture, fixture, seeded_show};

    async fn book(
        fx: &Fixture,
        actor: &Actor,
        show: &Show,
        seats: &[SeatId],
    ) -> Result<Booking, ServiceError> {
        fx.services
            .bookings
            .create_booking(
                actor,
                NewBooking {
                    show_id: show.id,
                    seat_ids: seats.to_vec(),
                    price: None,
                },
            )
            .await
    }

    #[tokio::test]
    async fn booking_is_priced_from_the_show() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 350, 4).await;
        let customer = Actor::user(UserId::new());

        let err = fx
            .services
            .bookings
            .create_booking(
                &customer,
                NewBooking {
                    show_id: show.id,
                    seat_ids: vec![seats[0].id, seats[1].id],
                    price: Some(1),
                },
            )
            .await
            .expect_err("tampered price");
        assert_eq!(err.to_string(), "Price mismatch: expected 700");

        let booking = fx
            .services
            .bookings
            .create_booking(
                &customer,
                NewBooking {
                    show_id: show.id,
                    seat_ids: vec![seats[0].id, seats[1].id],
                    price: Some(700),
                },
            )
            .await
            .expect("booking");
        assert_eq!(booking.price, Rupees(700));
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn empty_duplicate_and_unknown_requests_are_rejected() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 350, 2).await;
        let customer = Actor::user(UserId::new());
        assert!(matches!(
            book(&fx, &customer, &show, &[]).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            book(&fx, &customer, &show, &[seats[0].id, seats[0].id]).await,
            Err(ServiceError::BadRequest(_))
        ));
        let mut ghost = show.clone();
        ghost.id = ShowId::new();
        assert!(matches!(
            book(&fx, &customer, &ghost, &[seats[0].id]).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn overlapping_booking_fails_without_partial_reservation() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 200, 3).await;
        let first = Actor::user(UserId::new());
        let second = Actor::user(UserId::new());
        book(&fx, &first, &show, &[seats[0].id]).await.expect("first");

        let err = book(&fx, &second, &show, &[seats[1].id, seats[0].id])
            .await
            .expect_err("overlap");
        match err {
            ServiceError::SeatsUnavailable { seat_ids } => assert_eq!(seat_ids, vec![seats[0].id]),
            other => panic!("unexpected {other:?}"),
        }
        let after = fx.store.list_seats_by_show(show.id).await.expect("seats");
        assert!(after.iter().find(|s| s.id == seats[1].id).expect("seat").available);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_for_one_seat_have_one_winner() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 200, 1).await;
        let services = Arc::clone(&fx.services);
        let mut tasks = Vec::new();
        for _ in 0..12 {
            let services = Arc::clone(&services);
            let show_id = show.id;
            let seat = seats[0].id;
            tasks.push(tokio::spawn(async move {
                services
                    .bookings
                    .create_booking(
                        &Actor::user(UserId::new()),
                        NewBooking {
                            show_id,
                            seat_ids: vec![seat],
                            price: None,
                        },
                    )
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(fx.store.count_bookings().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn owners_may_only_cancel_and_cancel_releases_seats() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 200, 2).await;
        let owner = Actor::user(UserId::new());
        let booking = book(&fx, &owner, &show, &[seats[0].id]).await.expect("book");

        assert!(matches!(
            fx.services
                .bookings
                .change_status(&owner, booking.id, BookingStatus::Confirmed)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.services
                .bookings
                .change_status(&Actor::user(UserId::new()), booking.id, BookingStatus::Cancelled)
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        let cancelled = fx
            .services
            .bookings
            .change_status(&owner, booking.id, BookingStatus::Cancelled)
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let seat = fx.store.get_seats(&[seats[0].id]).await.expect("seat");
        assert!(seat[0].available);

        assert!(matches!(
            fx.services
                .bookings
                .change_status(&Actor::admin(UserId::new()), booking.id, BookingStatus::Confirmed)
                .await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn admin_confirms_pending_booking() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 200, 1).await;
        let owner = Actor::user(UserId::new());
        let booking = book(&fx, &owner, &show, &[seats[0].id]).await.expect("book");
        let confirmed = fx
            .services
            .bookings
            .change_status(&Actor::admin(UserId::new()), booking.id, BookingStatus::Confirmed)
            .await
            .expect("confirm");
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        let seat = fx.store.get_seats(&[seats[0].id]).await.expect("seat");
        assert!(!seat[0].available);
    }

    #[tokio::test]
    async fn details_fill_in_show_movie_and_seats() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 250, 2).await;
        let owner = Actor::user(UserId::new());
        let booking = book(&fx, &owner, &show, &[seats[1].id]).await.expect("book");

        let mine = fx
            .services
            .bookings
            .list_my_bookings(&owner)
            .await
            .expect("mine");
        assert_eq!(mine.len(), 1);
        let value = serde_json::to_value(&mine[0]).expect("serialize");
        assert_eq!(value["_id"], json!(booking.id.to_string()));
        assert_eq!(value["show"]["movieId"]["movieName"], json!("Jatra"));
        assert_eq!(value["seats"][0]["seatNo"], json!(seats[1].seat_no));
        assert_eq!(value["price"], json!(250));
        assert!(value["user"].is_null());

        assert!(matches!(
            fx.services
                .bookings
                .get_booking(&Actor::user(UserId::new()), booking.id)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.services.bookings.list_all_bookings(&owner).await,
            Err(ServiceError::Forbidden(_))
        ));
        let all = fx
            .services
            .bookings
            .list_all_bookings(&Actor::admin(UserId::new()))
            .await
            .expect("all");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn details_survive_deleted_show() {
        let fx = fixture();
        let (show, seats) = seeded_show(&fx, 250, 1).await;
        let owner = Actor::user(UserId::new());
        let booking = book(&fx, &owner, &show, &[seats[0].id]).await.expect("book");
        fx.store.delete_show(show.id).await.expect("delete");
        let details = fx
            .services
            .bookings
            .get_booking(&owner, booking.id)
            .await
            .expect("details");
        assert!(details.show.is_none());
        assert!(details.seats.is_empty());
    }
}
