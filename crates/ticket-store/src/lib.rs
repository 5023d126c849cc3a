mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use ticket_domain::{
    Booking, BookingId, BookingStatus, ContactMessage, FailedLoginOutcome, LockoutPolicy, Movie,
    MovieId, OtpChallenge, OtpPurpose, PageRequest, Payment, Seat, SeatId, Show, ShowId,
    UserAccount, UserId,
};

pub use memory::InMemoryTicketStore;
pub use postgres::PostgresTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("seats unavailable: {seat_ids:?}")]
    SeatsUnavailable { seat_ids: Vec<SeatId> },
    #[error("status mismatch: expected {expected}, found {actual}")]
    StatusMismatch { expected: String, actual: String },
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid value in column {field}: {value}")]
    InvalidColumn { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub password_hash: String,
    pub old_password_hashes: Vec<String>,
    pub password_expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Emails are unique regardless of case.
    async fn insert_user(&self, user: &UserAccount) -> Result<(), StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError>;
    async fn update_user(&self, user: &UserAccount) -> Result<(), StoreError>;
    /// Writes username, phone number, email and remembered devices only.
    async fn update_user_profile(&self, user: &UserAccount) -> Result<(), StoreError>;
    /// Counts a wrong password in place. A lapsed lock starts a fresh window.
    async fn record_failed_login(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<FailedLoginOutcome, StoreError>;
    async fn clear_failed_logins(&self, id: UserId) -> Result<(), StoreError>;
    async fn add_login_device(&self, id: UserId, device: &str) -> Result<(), StoreError>;
    /// Replaces the code in the slot for the challenge's purpose.
    async fn store_otp(&self, id: UserId, challenge: &OtpChallenge) -> Result<(), StoreError>;
    /// Clears a register or login code that still hashes to `code_hash` and
    /// records `device`; a register code also verifies the email. `None` once
    /// the code is gone, so each code is redeemed at most once.
    async fn redeem_otp(
        &self,
        id: UserId,
        purpose: OtpPurpose,
        code_hash: &str,
        device: &str,
    ) -> Result<Option<UserAccount>, StoreError>;
    /// Swaps in `change` and clears the reset code, provided the code still
    /// hashes to `code_hash`.
    async fn redeem_password_reset(
        &self,
        id: UserId,
        code_hash: &str,
        change: &PasswordChange,
    ) -> Result<bool, StoreError>;
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;
    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError>;
    async fn count_users(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait MovieRepository: Send + Sync {
    async fn insert_movie(&self, movie: &Movie) -> Result<(), StoreError>;
    async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, StoreError>;
    async fn update_movie(&self, movie: &Movie) -> Result<(), StoreError>;
    async fn delete_movie(&self, id: MovieId) -> Result<bool, StoreError>;
    async fn list_movies(&self) -> Result<Vec<Movie>, StoreError>;
    async fn page_movies(&self, page: PageRequest) -> Result<Vec<Movie>, StoreError>;
    async fn count_movies(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ShowRepository: Send + Sync {
    async fn insert_show(&self, show: &Show) -> Result<(), StoreError>;
    async fn get_show(&self, id: ShowId) -> Result<Option<Show>, StoreError>;
    async fn update_show(&self, show: &Show) -> Result<(), StoreError>;
    /// Removes the show together with its seats.
    async fn delete_show(&self, id: ShowId) -> Result<bool, StoreError>;
    async fn list_shows(&self) -> Result<Vec<Show>, StoreError>;
    async fn list_shows_by_movie(&self, movie_id: MovieId) -> Result<Vec<Show>, StoreError>;
    /// Returns the number of shows removed; their seats go with them.
    async fn delete_shows_by_movie(&self, movie_id: MovieId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SeatRepository: Send + Sync {
    /// Fails with `Conflict` if any seat number already exists in its show.
    async fn insert_seats(&self, seats: &[Seat]) -> Result<(), StoreError>;
    async fn list_seats_by_show(&self, show_id: ShowId) -> Result<Vec<Seat>, StoreError>;
    async fn get_seats(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError>;
    /// All-or-nothing: every seat must belong to `show_id`.
    async fn set_seat_availability(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        available: bool,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Flips every seat of `booking` to unavailable and stores the booking
    /// in one step. If any seat is missing, belongs to another show or is
    /// already taken nothing changes.
    async fn reserve_and_insert_booking(&self, booking: &Booking) -> Result<(), StoreError>;
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;
    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError>;
    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;
    async fn count_bookings(&self) -> Result<u64, StoreError>;
    /// Compare-and-set on the booking status.
    async fn update_booking_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, StoreError>;
    /// Marks the booking cancelled and releases its seats.
    async fn cancel_booking(
        &self,
        id: BookingId,
        expected: BookingStatus,
    ) -> Result<Booking, StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;
    async fn get_payment_by_pidx(&self, pidx: &str) -> Result<Option<Payment>, StoreError>;
    async fn list_payments_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, StoreError>;
    /// Completes an initiated payment and confirms its pending booking.
    async fn complete_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError>;
    /// Completes an initiated payment without touching its booking.
    async fn complete_unbooked_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError>;
    async fn fail_payment(&self, pidx: &str) -> Result<Payment, StoreError>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError>;
    async fn list_contacts(&self) -> Result<Vec<ContactMessage>, StoreError>;
}

/// Everything the services need from storage.
pub trait TicketStore:
    UserRepository
    + MovieRepository
    + ShowRepository
    + SeatRepository
    + BookingRepository
    + PaymentRepository
    + ContactRepository
{
}

impl<T> TicketStore for T where
    T: UserRepository
        + MovieRepository
        + ShowRepository
        + SeatRepository
        + BookingRepository
        + PaymentRepository
        + ContactRepository
{
}
