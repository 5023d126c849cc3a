use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ticket_domain::{
    Booking, BookingId, BookingStatus, ContactMessage, FailedLoginOutcome, LockoutPolicy, Movie,
    MovieId, OtpChallenge, OtpPurpose, PageRequest, Payment, PaymentStatus, Seat, SeatId, Show,
    ShowId, UserAccount, UserId,
};

use crate::{
    BookingRepository, ContactRepository, MovieRepository, PasswordChange, PaymentRepository,
    SeatRepository, ShowRepository, StoreError, UserRepository,
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserAccount>,
    movies: Vec<Movie>,
    shows: Vec<Show>,
    seats: Vec<Seat>,
    bookings: Vec<Booking>,
    payments: Vec<Payment>,
    contacts: Vec<ContactMessage>,
}

/// One lock guards every table, so multi-table updates are atomic.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTicketStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryTicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Tables {
    fn user_mut(&mut self, id: UserId) -> Result<&mut UserAccount, StoreError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound("user"))
    }

    fn email_taken(&self, user: &UserAccount) -> bool {
        self.users
            .iter()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
    }
}

fn status_mismatch(expected: &str, actual: &str) -> StoreError {
    StoreError::StatusMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[async_trait]
impl UserRepository for InMemoryTicketStore {
    async fn insert_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!("user {}", user.email)));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.lock()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let email = email.trim();
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.email_taken(user) {
            return Err(StoreError::Conflict(format!("user {}", user.email)));
        }
        *tables.user_mut(user.id)? = user.clone();
        Ok(())
    }

    async fn update_user_profile(&self, user: &UserAccount) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.email_taken(user) {
            return Err(StoreError::Conflict(format!("user {}", user.email)));
        }
        let slot = tables.user_mut(user.id)?;
        slot.username.clone_from(&user.username);
        slot.phone_number.clone_from(&user.phone_number);
        slot.email.clone_from(&user.email);
        slot.remembered_devices.clone_from(&user.remembered_devices);
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<FailedLoginOutcome, StoreError> {
        Ok(self.lock()?.user_mut(id)?.record_failed_login(now, policy))
    }

    async fn clear_failed_logins(&self, id: UserId) -> Result<(), StoreError> {
        self.lock()?.user_mut(id)?.reset_login_attempts();
        Ok(())
    }

    async fn add_login_device(&self, id: UserId, device: &str) -> Result<(), StoreError> {
        self.lock()?.user_mut(id)?.record_login_device(device);
        Ok(())
    }

    async fn store_otp(&self, id: UserId, challenge: &OtpChallenge) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let user = tables.user_mut(id)?;
        match challenge.purpose {
            OtpPurpose::PasswordReset => user.reset_otp = Some(challenge.clone()),
            OtpPurpose::Register | OtpPurpose::Login => user.otp = Some(challenge.clone()),
        }
        Ok(())
    }

    async fn redeem_otp(
        &self,
        id: UserId,
        purpose: OtpPurpose,
        code_hash: &str,
        device: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let mut tables = self.lock()?;
        let user = tables.user_mut(id)?;
        let live = user
            .otp
            .as_ref()
            .is_some_and(|c| c.purpose == purpose && c.code_hash == code_hash);
        if !live {
            return Ok(None);
        }
        user.otp = None;
        if purpose == OtpPurpose::Register {
            user.is_verified = true;
        }
        user.record_login_device(device);
        Ok(Some(user.clone()))
    }

    async fn redeem_password_reset(
        &self,
        id: UserId,
        code_hash: &str,
        change: &PasswordChange,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let user = tables.user_mut(id)?;
        let live = user.reset_otp.as_ref().is_some_and(|c| {
            c.purpose == OtpPurpose::PasswordReset && c.code_hash == code_hash
        });
        if !live {
            return Ok(false);
        }
        user.reset_otp = None;
        user.password_hash.clone_from(&change.password_hash);
        user.old_password_hashes.clone_from(&change.old_password_hashes);
        user.password_expires_at = change.password_expires_at;
        Ok(true)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        Ok(tables.users.len() != before)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError> {
        Ok(self.lock()?.users.clone())
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.users.len() as u64)
    }
}

#[async_trait]
impl MovieRepository for InMemoryTicketStore {
    async fn insert_movie(&self, movie: &Movie) -> Result<(), StoreError> {
        self.lock()?.movies.push(movie.clone());
        Ok(())
    }

    async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, StoreError> {
        Ok(self.lock()?.movies.iter().find(|m| m.id == id).cloned())
    }

    async fn update_movie(&self, movie: &Movie) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables
            .movies
            .iter_mut()
            .find(|m| m.id == movie.id)
            .ok_or(StoreError::NotFound("movie"))?;
        *slot = movie.clone();
        Ok(())
    }

    async fn delete_movie(&self, id: MovieId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.movies.len();
        tables.movies.retain(|m| m.id != id);
        Ok(tables.movies.len() != before)
    }

    async fn list_movies(&self) -> Result<Vec<Movie>, StoreError> {
        Ok(self.lock()?.movies.clone())
    }

    async fn page_movies(&self, page: PageRequest) -> Result<Vec<Movie>, StoreError> {
        Ok(self
            .lock()?
            .movies
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn count_movies(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.movies.len() as u64)
    }
}

#[async_trait]
impl ShowRepository for InMemoryTicketStore {
    async fn insert_show(&self, show: &Show) -> Result<(), StoreError> {
        self.lock()?.shows.push(show.clone());
        Ok(())
    }

    async fn get_show(&self, id: ShowId) -> Result<Option<Show>, StoreError> {
        Ok(self.lock()?.shows.iter().find(|s| s.id == id).cloned())
    }

    async fn update_show(&self, show: &Show) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables
            .shows
            .iter_mut()
            .find(|s| s.id == show.id)
            .ok_or(StoreError::NotFound("show"))?;
        *slot = show.clone();
        Ok(())
    }

    async fn delete_show(&self, id: ShowId) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.shows.len();
        tables.shows.retain(|s| s.id != id);
        tables.seats.retain(|seat| seat.show_id != id);
        Ok(tables.shows.len() != before)
    }

    async fn list_shows(&self) -> Result<Vec<Show>, StoreError> {
        Ok(self.lock()?.shows.clone())
    }

    async fn list_shows_by_movie(&self, movie_id: MovieId) -> Result<Vec<Show>, StoreError> {
        Ok(self
            .lock()?
            .shows
            .iter()
            .filter(|s| s.movie_id == movie_id)
            .cloned()
            .collect())
    }

    async fn delete_shows_by_movie(&self, movie_id: MovieId) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let doomed: Vec<ShowId> = tables
            .shows
            .iter()
            .filter(|s| s.movie_id == movie_id)
            .map(|s| s.id)
            .collect();
        tables.shows.retain(|s| s.movie_id != movie_id);
        tables.seats.retain(|seat| !doomed.contains(&seat.show_id));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl SeatRepository for InMemoryTicketStore {
    async fn insert_seats(&self, seats: &[Seat]) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        for (idx, seat) in seats.iter().enumerate() {
            let clash_existing = tables
                .seats
                .iter()
                .any(|s| s.show_id == seat.show_id && s.seat_no == seat.seat_no);
            let clash_batch = seats[..idx]
                .iter()
                .any(|s| s.show_id == seat.show_id && s.seat_no == seat.seat_no);
            if clash_existing || clash_batch {
                return Err(StoreError::Conflict(format!("seat {}", seat.seat_no)));
            }
        }
        tables.seats.extend_from_slice(seats);
        Ok(())
    }

    async fn list_seats_by_show(&self, show_id: ShowId) -> Result<Vec<Seat>, StoreError> {
        Ok(self
            .lock()?
            .seats
            .iter()
            .filter(|s| s.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn get_seats(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        Ok(self
            .lock()?
            .seats
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn set_seat_availability(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        available: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let missing: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|id| {
                !tables
                    .seats
                    .iter()
                    .any(|s| s.id == *id && s.show_id == show_id)
            })
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::SeatsUnavailable { seat_ids: missing });
        }
        for seat in tables.seats.iter_mut().filter(|s| seat_ids.contains(&s.id)) {
            seat.available = available;
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryTicketStore {
    async fn reserve_and_insert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let unavailable: Vec<SeatId> = booking
            .seats
            .iter()
            .copied()
            .filter(|id| {
                !tables
                    .seats
                    .iter()
                    .any(|s| s.id == *id && s.show_id == booking.show_id && s.available)
            })
            .collect();
        if !unavailable.is_empty() {
            return Err(StoreError::SeatsUnavailable {
                seat_ids: unavailable,
            });
        }
        for seat in tables
            .seats
            .iter_mut()
            .filter(|s| booking.seats.contains(&s.id))
        {
            seat.available = false;
        }
        tables.bookings.push(booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock()?.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.lock()?.bookings.clone())
    }

    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .lock()?
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_bookings(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.bookings.len() as u64)
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut tables = self.lock()?;
        let booking = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::NotFound("booking"))?;
        if booking.status != expected {
            return Err(status_mismatch(expected.as_str(), booking.status.as_str()));
        }
        booking.status = next;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn cancel_booking(
        &self,
        id: BookingId,
        expected: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut tables = self.lock()?;
        let booking = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::NotFound("booking"))?;
        if booking.status != expected {
            return Err(status_mismatch(expected.as_str(), booking.status.as_str()));
        }
        booking.status = BookingStatus::Cancelled;
        booking.updated_at = Utc::now();
        let cancelled = booking.clone();
        for seat in tables
            .seats
            .iter_mut()
            .filter(|s| cancelled.seats.contains(&s.id))
        {
            seat.available = true;
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryTicketStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.payments.iter().any(|p| p.pidx == payment.pidx) {
            return Err(StoreError::Conflict(format!("payment {}", payment.pidx)));
        }
        tables.payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment_by_pidx(&self, pidx: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock()?.payments.iter().find(|p| p.pidx == pidx).cloned())
    }

    async fn list_payments_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .lock()?
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn complete_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError> {
        let mut guard = self.lock()?;
        let tables = &mut *guard;
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.pidx == pidx)
            .ok_or(StoreError::NotFound("payment"))?;
        if payment.status != PaymentStatus::Initiated {
            return Err(status_mismatch(
                PaymentStatus::Initiated.as_str(),
                payment.status.as_str(),
            ));
        }
        let booking = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == payment.booking_id)
            .ok_or(StoreError::NotFound("booking"))?;
        if booking.status != BookingStatus::Pending {
            return Err(status_mismatch(
                BookingStatus::Pending.as_str(),
                booking.status.as_str(),
            ));
        }
        let now = Utc::now();
        booking.status = BookingStatus::Confirmed;
        booking.updated_at = now;
        payment.status = PaymentStatus::Completed;
        payment.transaction_id = transaction_id;
        payment.updated_at = now;
        Ok(payment.clone())
    }

    async fn complete_unbooked_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError> {
        let mut tables = self.lock()?;
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.pidx == pidx)
            .ok_or(StoreError::NotFound("payment"))?;
        if payment.status != PaymentStatus::Initiated {
            return Err(status_mismatch(
                PaymentStatus::Initiated.as_str(),
                payment.status.as_str(),
            ));
        }
        payment.status = PaymentStatus::Completed;
        payment.transaction_id = transaction_id;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn fail_payment(&self, pidx: &str) -> Result<Payment, StoreError> {
        let mut tables = self.lock()?;
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.pidx == pidx)
            .ok_or(StoreError::NotFound("payment"))?;
        if payment.status != PaymentStatus::Initiated {
            return Err(status_mismatch(
                PaymentStatus::Initiated.as_str(),
                payment.status.as_str(),
            ));
        }
        payment.status = PaymentStatus::Failed;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }
}

#[async_trait]
impl ContactRepository for InMemoryTicketStore {
    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.lock()?.contacts.push(message.clone());
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactMessage>, StoreError> {
        Ok(self.lock()?.contacts.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use ticket_domain::{AuthProvider, Rupees};

    use super::*;

    fn user(email: &str) -> UserAccount {
        let now = Utc::now();
        UserAccount {
            id: UserId::new(),
            username: "gita".to_string(),
            phone_number: "9811111111".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            old_password_hashes: vec!["hash".to_string()],
            is_admin: false,
            is_verified: false,
            login_attempts: 0,
            lock_until: None,
            password_expires_at: now + Duration::days(90),
            otp: None,
            reset_otp: None,
            login_devices: Vec::new(),
            remembered_devices: Vec::new(),
            auth_provider: AuthProvider::Password,
            created_at: now,
        }
    }

    fn show() -> Show {
        Show {
            id: ShowId::new(),
            movie_id: MovieId::new(),
            show_date: "2026-11-01".to_string(),
            show_time: "19:00".to_string(),
            show_price: Rupees(300),
            created_at: Utc::now(),
        }
    }

    fn booking(show_id: ShowId, seats: Vec<SeatId>) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            user_id: UserId::new(),
            show_id,
            price: Rupees(300).checked_mul(seats.len() as u64).expect("price"),
            seats,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store_with_seats(labels: &[&str]) -> (InMemoryTicketStore, Show, Vec<Seat>) {
        let store = InMemoryTicketStore::new();
        let show = show();
        store.insert_show(&show).await.expect("show");
        let seats: Vec<Seat> = labels.iter().map(|l| Seat::new(show.id, *l)).collect();
        store.insert_seats(&seats).await.expect("seats");
        (store, show, seats)
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let store = InMemoryTicketStore::new();
        store.insert_user(&user("gita@example.com")).await.expect("insert");
        let err = store
            .insert_user(&user("GITA@example.com"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(
            store
                .find_user_by_email("Gita@Example.com")
                .await
                .expect("find")
                .is_some()
        );
    }

    #[tokio::test]
    async fn duplicate_seat_numbers_are_rejected() {
        let (store, show, _) = store_with_seats(&["A1", "A2"]).await;
        let err = store
            .insert_seats(&[Seat::new(show.id, "A3"), Seat::new(show.id, "A1")])
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_seats_by_show(show.id).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn reservation_is_all_or_nothing() {
        let (store, show, seats) = store_with_seats(&["A1", "A2", "A3"]).await;
        store
            .reserve_and_insert_booking(&booking(show.id, vec![seats[0].id]))
            .await
            .expect("first booking");

        let err = store
            .reserve_and_insert_booking(&booking(show.id, vec![seats[1].id, seats[0].id]))
            .await
            .expect_err("overlap");
        match err {
            StoreError::SeatsUnavailable { seat_ids } => assert_eq!(seat_ids, vec![seats[0].id]),
            other => panic!("unexpected error: {other}"),
        }
        let current = store.list_seats_by_show(show.id).await.expect("list");
        assert!(current.iter().find(|s| s.id == seats[1].id).expect("a2").available);
        assert_eq!(store.count_bookings().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn seats_from_another_show_cannot_be_reserved() {
        let (store, _, seats) = store_with_seats(&["A1"]).await;
        let other = show();
        store.insert_show(&other).await.expect("show");
        let err = store
            .reserve_and_insert_booking(&booking(other.id, vec![seats[0].id]))
            .await
            .expect_err("wrong show");
        assert!(matches!(err, StoreError::SeatsUnavailable { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_of_one_seat_admit_a_single_winner() {
        let (store, show, seats) = store_with_seats(&["B7"]).await;
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let candidate = booking(show.id, vec![seats[0].id]);
            handles.push(tokio::spawn(async move {
                store.reserve_and_insert_booking(&candidate).await.is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.count_bookings().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn cancel_releases_seats_and_checks_expected_status() {
        let (store, show, seats) = store_with_seats(&["C1", "C2"]).await;
        let pending = booking(show.id, vec![seats[0].id, seats[1].id]);
        store
            .reserve_and_insert_booking(&pending)
            .await
            .expect("reserve");

        let err = store
            .cancel_booking(pending.id, BookingStatus::Confirmed)
            .await
            .expect_err("stale");
        assert!(matches!(err, StoreError::StatusMismatch { .. }));

        let cancelled = store
            .cancel_booking(pending.id, BookingStatus::Pending)
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let current = store.list_seats_by_show(show.id).await.expect("list");
        assert!(current.iter().all(|s| s.available));
    }

    #[tokio::test]
    async fn completing_payment_confirms_booking_once() {
        let (store, show, seats) = store_with_seats(&["D1"]).await;
        let pending = booking(show.id, vec![seats[0].id]);
        store
            .reserve_and_insert_booking(&pending)
            .await
            .expect("reserve");
        let now = Utc::now();
        store
            .insert_payment(&Payment {
                id: ticket_domain::PaymentId::new(),
                booking_id: pending.id,
                user_id: pending.user_id,
                pidx: "pidx-1".to_string(),
                amount_paisa: 30_000,
                status: PaymentStatus::Initiated,
                transaction_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("payment");

        let paid = store
            .complete_payment("pidx-1", Some("txn-9".to_string()))
            .await
            .expect("complete");
        assert_eq!(paid.status, PaymentStatus::Completed);
        let confirmed = store
            .get_booking(pending.id)
            .await
            .expect("get")
            .expect("booking");
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        assert!(matches!(
            store.complete_payment("pidx-1", None).await,
            Err(StoreError::StatusMismatch { .. })
        ));
        assert!(matches!(
            store.fail_payment("missing").await,
            Err(StoreError::NotFound("payment"))
        ));
    }

    #[tokio::test]
    async fn deleting_shows_by_movie_removes_their_seats() {
        let (store, show, _) = store_with_seats(&["E1", "E2"]).await;
        assert_eq!(
            store
                .delete_shows_by_movie(show.movie_id)
                .await
                .expect("delete"),
            1
        );
        assert!(store.list_seats_by_show(show.id).await.expect("list").is_empty());
        assert!(store.get_show(show.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn admin_availability_override_requires_every_seat_in_show() {
        let (store, show, seats) = store_with_seats(&["F1", "F2"]).await;
        let stranger = SeatId::new();
        let err = store
            .set_seat_availability(show.id, &[seats[0].id, stranger], false)
            .await
            .expect_err("unknown seat");
        assert!(matches!(err, StoreError::SeatsUnavailable { ref seat_ids } if seat_ids == &vec![stranger]));
        assert!(store.list_seats_by_show(show.id).await.expect("list").iter().all(|s| s.available));

        store
            .set_seat_availability(show.id, &[seats[1].id], false)
            .await
            .expect("override");
        let after = store.get_seats(&[seats[1].id]).await.expect("get");
        assert!(!after[0].available);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_failed_logins_each_count() {
        let store = InMemoryTicketStore::new();
        let gita = user("gita@example.com");
        store.insert_user(&gita).await.expect("insert");
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        let mut tasks = Vec::new();
        for _ in 0..policy.max_attempts {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.record_failed_login(gita.id, now, policy).await
            }));
        }
        let mut locked = 0;
        for task in tasks {
            if let FailedLoginOutcome::Locked { .. } = task.await.expect("join").expect("record") {
                locked += 1;
            }
        }
        assert_eq!(locked, 1);
        let stored = store.get_user(gita.id).await.expect("get").expect("user");
        assert_eq!(stored.login_attempts, policy.max_attempts);
        assert_eq!(stored.lock_until, Some(now + policy.lock_duration));

        store.clear_failed_logins(gita.id).await.expect("clear");
        let stored = store.get_user(gita.id).await.expect("get").expect("user");
        assert_eq!(stored.login_attempts, 0);
        assert!(stored.lock_until.is_none());
    }

    #[tokio::test]
    async fn otp_codes_are_redeemed_once_and_per_purpose() {
        let store = InMemoryTicketStore::new();
        let gita = user("gita@example.com");
        store.insert_user(&gita).await.expect("insert");
        store
            .store_otp(
                gita.id,
                &OtpChallenge {
                    purpose: OtpPurpose::Register,
                    code_hash: "digest".to_string(),
                    expires_at: Utc::now() + Duration::minutes(10),
                },
            )
            .await
            .expect("store");

        let wrong_purpose = store
            .redeem_otp(gita.id, OtpPurpose::Login, "digest", "Firefox")
            .await
            .expect("redeem");
        assert!(wrong_purpose.is_none());

        let redeemed = store
            .redeem_otp(gita.id, OtpPurpose::Register, "digest", "Firefox")
            .await
            .expect("redeem")
            .expect("live code");
        assert!(redeemed.is_verified);
        assert!(redeemed.otp.is_none());
        assert_eq!(redeemed.login_devices, vec!["Firefox".to_string()]);

        let again = store
            .redeem_otp(gita.id, OtpPurpose::Register, "digest", "Firefox")
            .await
            .expect("redeem");
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn password_reset_needs_the_live_reset_code() {
        let store = InMemoryTicketStore::new();
        let gita = user("gita@example.com");
        store.insert_user(&gita).await.expect("insert");
        store
            .store_otp(
                gita.id,
                &OtpChallenge {
                    purpose: OtpPurpose::PasswordReset,
                    code_hash: "reset-digest".to_string(),
                    expires_at: Utc::now() + Duration::minutes(10),
                },
            )
            .await
            .expect("store");
        let change = PasswordChange {
            password_hash: "new-hash".to_string(),
            old_password_hashes: vec!["hash".to_string(), "new-hash".to_string()],
            password_expires_at: Utc::now() + Duration::days(90),
        };

        assert!(
            !store
                .redeem_password_reset(gita.id, "other-digest", &change)
                .await
                .expect("redeem")
        );
        assert!(
            store
                .redeem_password_reset(gita.id, "reset-digest", &change)
                .await
                .expect("redeem")
        );
        assert!(
            !store
                .redeem_password_reset(gita.id, "reset-digest", &change)
                .await
                .expect("redeem")
        );
        let stored = store.get_user(gita.id).await.expect("get").expect("user");
        assert_eq!(stored.password_hash, "new-hash");
        assert!(stored.reset_otp.is_none());
    }

    #[tokio::test]
    async fn profile_update_leaves_security_fields_alone() {
        let store = InMemoryTicketStore::new();
        let gita = user("gita@example.com");
        store.insert_user(&gita).await.expect("insert");
        store
            .record_failed_login(gita.id, Utc::now(), LockoutPolicy::default())
            .await
            .expect("record");

        let mut edited = gita.clone();
        edited.username = "Gita Rai".to_string();
        edited.remembered_devices = vec!["Safari".to_string()];
        store.update_user_profile(&edited).await.expect("profile");

        let stored = store.get_user(gita.id).await.expect("get").expect("user");
        assert_eq!(stored.username, "Gita Rai");
        assert_eq!(stored.remembered_devices, vec!["Safari".to_string()]);
        assert_eq!(stored.login_attempts, 1);
    }
}
