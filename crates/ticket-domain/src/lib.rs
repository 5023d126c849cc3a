pub mod account;
pub mod activity;
pub mod booking;
pub mod catalog;
pub mod errors;
pub mod ids;
pub mod money;
pub mod paging;

pub use account::{
    AuthProvider, FailedLoginOutcome, LockoutPolicy, OtpChallenge, OtpPurpose, UserAccount,
    UserProfile,
};
pub use activity::{ActivityLog, ContactMessage, GUEST_USER, LogLevel};
pub use booking::{Booking, BookingStatus, Payment, PaymentStatus};
pub use catalog::{MAX_SEAT_ROWS, MAX_SEATS_PER_ROW, Movie, Seat, Show, seat_labels};
pub use errors::DomainError;
pub use ids::{BookingId, ContactId, LogId, MovieId, PaymentId, SeatId, ShowId, UserId};
pub use money::{MoneyError, Rupees};
pub use paging::PageRequest;
