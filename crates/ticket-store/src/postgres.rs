use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use ticket_domain::{
    AuthProvider, Booking, BookingId, BookingStatus, ContactId, ContactMessage,
    FailedLoginOutcome, LockoutPolicy, Movie, MovieId, OtpChallenge, OtpPurpose, PageRequest,
    Payment, PaymentId, PaymentStatus, Rupees, Seat, SeatId, Show, ShowId, UserAccount, UserId,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    BookingRepository, ContactRepository, MovieRepository, PasswordChange, PaymentRepository,
    SeatRepository, ShowRepository, StoreError, UserRepository,
};

#[derive(Debug, Clone)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(db_err)
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn write_err(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => db_err(e),
    }
}

fn invalid(field: &'static str, value: impl ToString) -> StoreError {
    StoreError::InvalidColumn {
        field,
        value: value.to_string(),
    }
}

fn to_i64(value: u64, field: &'static str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| invalid(field, value))
}

fn to_u64(value: i64, field: &'static str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| invalid(field, value))
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    (
        i64::try_from(page.limit).unwrap_or(i64::MAX),
        i64::try_from(page.offset).unwrap_or(i64::MAX),
    )
}

fn row_to_user(row: &PgRow) -> Result<UserAccount, StoreError> {
    let provider: String = row.try_get("auth_provider").map_err(db_err)?;
    let attempts: i32 = row.try_get("login_attempts").map_err(db_err)?;
    Ok(UserAccount {
        id: UserId(row.try_get::<Uuid, _>("user_id").map_err(db_err)?),
        username: row.try_get("username").map_err(db_err)?,
        phone_number: row.try_get("phone_number").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        password_hash: row.try_get("password_hash").map_err(db_err)?,
        old_password_hashes: row.try_get("old_password_hashes").map_err(db_err)?,
        is_admin: row.try_get("is_admin").map_err(db_err)?,
        is_verified: row.try_get("is_verified").map_err(db_err)?,
        login_attempts: u32::try_from(attempts).map_err(|_| invalid("login_attempts", attempts))?,
        lock_until: row.try_get("lock_until").map_err(db_err)?,
        password_expires_at: row.try_get("password_expires_at").map_err(db_err)?,
        otp: row
            .try_get::<Option<Json<OtpChallenge>>, _>("otp")
            .map_err(db_err)?
            .map(|json| json.0),
        reset_otp: row
            .try_get::<Option<Json<OtpChallenge>>, _>("reset_otp")
            .map_err(db_err)?
            .map(|json| json.0),
        login_devices: row.try_get("login_devices").map_err(db_err)?,
        remembered_devices: row.try_get("remembered_devices").map_err(db_err)?,
        auth_provider: provider
            .parse::<AuthProvider>()
            .map_err(|_| invalid("auth_provider", &provider))?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_movie(row: &PgRow) -> Result<Movie, StoreError> {
    Ok(Movie {
        id: MovieId(row.try_get("movie_id").map_err(db_err)?),
        movie_name: row.try_get("movie_name").map_err(db_err)?,
        movie_genre: row.try_get("movie_genre").map_err(db_err)?,
        movie_details: row.try_get("movie_details").map_err(db_err)?,
        movie_rated: row.try_get("movie_rated").map_err(db_err)?,
        movie_duration: row.try_get("movie_duration").map_err(db_err)?,
        movie_poster_image: row.try_get("movie_poster_image").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_show(row: &PgRow) -> Result<Show, StoreError> {
    Ok(Show {
        id: ShowId(row.try_get("show_id").map_err(db_err)?),
        movie_id: MovieId(row.try_get("movie_id").map_err(db_err)?),
        show_date: row.try_get("show_date").map_err(db_err)?,
        show_time: row.try_get("show_time").map_err(db_err)?,
        show_price: Rupees(to_u64(
            row.try_get("show_price").map_err(db_err)?,
            "show_price",
        )?),
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_seat(row: &PgRow) -> Result<Seat, StoreError> {
    Ok(Seat {
        id: SeatId(row.try_get("seat_id").map_err(db_err)?),
        show_id: ShowId(row.try_get("show_id").map_err(db_err)?),
        seat_no: row.try_get("seat_no").map_err(db_err)?,
        available: row.try_get("available").map_err(db_err)?,
    })
}

fn row_to_booking(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let seat_ids: Vec<Uuid> = row.try_get("seat_ids").map_err(db_err)?;
    Ok(Booking {
        id: BookingId(row.try_get("booking_id").map_err(db_err)?),
        user_id: UserId(row.try_get("user_id").map_err(db_err)?),
        show_id: ShowId(row.try_get("show_id").map_err(db_err)?),
        seats: seat_ids.into_iter().map(SeatId).collect(),
        price: Rupees(to_u64(row.try_get("price").map_err(db_err)?, "price")?),
        status: status
            .parse::<BookingStatus>()
            .map_err(|_| invalid("status", &status))?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment, StoreError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Payment {
        id: PaymentId(row.try_get("payment_id").map_err(db_err)?),
        booking_id: BookingId(row.try_get("booking_id").map_err(db_err)?),
        user_id: UserId(row.try_get("user_id").map_err(db_err)?),
        pidx: row.try_get("pidx").map_err(db_err)?,
        amount_paisa: to_u64(
            row.try_get("amount_paisa").map_err(db_err)?,
            "amount_paisa",
        )?,
        status: status
            .parse::<PaymentStatus>()
            .map_err(|_| invalid("status", &status))?,
        transaction_id: row.try_get("transaction_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_contact(row: &PgRow) -> Result<ContactMessage, StoreError> {
    Ok(ContactMessage {
        id: ContactId(row.try_get("contact_id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        subject: row.try_get("subject").map_err(db_err)?,
        message: row.try_get("message").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn seat_uuids(ids: &[SeatId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.0).collect()
}

#[async_trait]
impl UserRepository for PostgresTicketStore {
    async fn insert_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, username, phone_number, email, password_hash, old_password_hashes,
                is_admin, is_verified, login_attempts, lock_until, password_expires_at,
                otp, reset_otp, login_devices, remembered_devices, auth_provider, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17
            )
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.old_password_hashes)
        .bind(user.is_admin)
        .bind(user.is_verified)
        .bind(i32::try_from(user.login_attempts).unwrap_or(i32::MAX))
        .bind(user.lock_until)
        .bind(user.password_expires_at)
        .bind(user.otp.clone().map(Json))
        .bind(user.reset_otp.clone().map(Json))
        .bind(&user.login_devices)
        .bind(&user.remembered_devices)
        .bind(user.auth_provider.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("user {}", user.email)))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2, phone_number = $3, email = $4, password_hash = $5,
                old_password_hashes = $6, is_admin = $7, is_verified = $8, login_attempts = $9,
                lock_until = $10, password_expires_at = $11, otp = $12, reset_otp = $13,
                login_devices = $14, remembered_devices = $15, auth_provider = $16
            WHERE user_id = $1
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.old_password_hashes)
        .bind(user.is_admin)
        .bind(user.is_verified)
        .bind(i32::try_from(user.login_attempts).unwrap_or(i32::MAX))
        .bind(user.lock_until)
        .bind(user.password_expires_at)
        .bind(user.otp.clone().map(Json))
        .bind(user.reset_otp.clone().map(Json))
        .bind(&user.login_devices)
        .bind(&user.remembered_devices)
        .bind(user.auth_provider.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("user {}", user.email)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn update_user_profile(&self, user: &UserAccount) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2, phone_number = $3, email = $4, remembered_devices = $5
            WHERE user_id = $1
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(&user.email)
        .bind(&user.remembered_devices)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("user {}", user.email)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<FailedLoginOutcome, StoreError> {
        let max_attempts = i32::try_from(policy.max_attempts).unwrap_or(i32::MAX);
        // the row lock serialises concurrent failures on one account
        let row = sqlx::query(
            r#"
            UPDATE users SET
                login_attempts = CASE
                    WHEN lock_until IS NOT NULL AND lock_until <= $2 THEN 1
                    ELSE login_attempts + 1
                END,
                lock_until = CASE
                    WHEN (CASE
                        WHEN lock_until IS NOT NULL AND lock_until <= $2 THEN 1
                        ELSE login_attempts + 1
                    END) >= $3 THEN $4
                    WHEN lock_until IS NOT NULL AND lock_until <= $2 THEN NULL
                    ELSE lock_until
                END
            WHERE user_id = $1
            RETURNING login_attempts, lock_until
            "#,
        )
        .bind(id.0)
        .bind(now)
        .bind(max_attempts)
        .bind(now + policy.lock_duration)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::NotFound("user"))?;

        let attempts: i32 = row.try_get("login_attempts").map_err(db_err)?;
        let attempts =
            u32::try_from(attempts).map_err(|_| invalid("login_attempts", attempts))?;
        let lock_until: Option<DateTime<Utc>> = row.try_get("lock_until").map_err(db_err)?;
        match lock_until {
            Some(until) if attempts >= policy.max_attempts => {
                Ok(FailedLoginOutcome::Locked { until })
            }
            _ => Ok(FailedLoginOutcome::Remaining(
                policy.max_attempts.saturating_sub(attempts),
            )),
        }
    }

    async fn clear_failed_logins(&self, id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET login_attempts = 0, lock_until = NULL WHERE user_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn add_login_device(&self, id: UserId, device: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users SET login_devices = CASE
                WHEN $2 = ANY(login_devices) THEN login_devices
                ELSE array_append(login_devices, $2)
            END
            WHERE user_id = $1
            "#,
        )
        .bind(id.0)
        .bind(device)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn store_otp(&self, id: UserId, challenge: &OtpChallenge) -> Result<(), StoreError> {
        let sql = match challenge.purpose {
            OtpPurpose::PasswordReset => "UPDATE users SET reset_otp = $2 WHERE user_id = $1",
            OtpPurpose::Register | OtpPurpose::Login => {
                "UPDATE users SET otp = $2 WHERE user_id = $1"
            }
        };
        let result = sqlx::query(sql)
            .bind(id.0)
            .bind(Json(challenge.clone()))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
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
        let row = sqlx::query(
            r#"
            UPDATE users SET
                otp = NULL,
                is_verified = is_verified OR $4,
                login_devices = CASE
                    WHEN $5 = ANY(login_devices) THEN login_devices
                    ELSE array_append(login_devices, $5)
                END
            WHERE user_id = $1 AND otp->>'purpose' = $2 AND otp->>'code_hash' = $3
            RETURNING *
            "#,
        )
        .bind(id.0)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(purpose == OtpPurpose::Register)
        .bind(device)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn redeem_password_reset(
        &self,
        id: UserId,
        code_hash: &str,
        change: &PasswordChange,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $3, old_password_hashes = $4, password_expires_at = $5,
                reset_otp = NULL
            WHERE user_id = $1
                AND reset_otp->>'purpose' = 'password_reset'
                AND reset_otp->>'code_hash' = $2
            "#,
        )
        .bind(id.0)
        .bind(code_hash)
        .bind(&change.password_hash)
        .bind(&change.old_password_hashes)
        .bind(change.password_expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_user).collect()
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        to_u64(count, "count")
    }
}

#[async_trait]
impl MovieRepository for PostgresTicketStore {
    async fn insert_movie(&self, movie: &Movie) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO movies (
                movie_id, movie_name, movie_genre, movie_details, movie_rated,
                movie_duration, movie_poster_image, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movie.id.0)
        .bind(&movie.movie_name)
        .bind(&movie.movie_genre)
        .bind(&movie.movie_details)
        .bind(&movie.movie_rated)
        .bind(&movie.movie_duration)
        .bind(&movie.movie_poster_image)
        .bind(movie.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("movie {}", movie.id)))?;
        Ok(())
    }

    async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, StoreError> {
        let row = sqlx::query("SELECT * FROM movies WHERE movie_id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_movie).transpose()
    }

    async fn update_movie(&self, movie: &Movie) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE movies SET
                movie_name = $2, movie_genre = $3, movie_details = $4, movie_rated = $5,
                movie_duration = $6, movie_poster_image = $7
            WHERE movie_id = $1
            "#,
        )
        .bind(movie.id.0)
        .bind(&movie.movie_name)
        .bind(&movie.movie_genre)
        .bind(&movie.movie_details)
        .bind(&movie.movie_rated)
        .bind(&movie.movie_duration)
        .bind(&movie.movie_poster_image)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("movie"));
        }
        Ok(())
    }

    async fn delete_movie(&self, id: MovieId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE movie_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_movies(&self) -> Result<Vec<Movie>, StoreError> {
        let rows = sqlx::query("SELECT * FROM movies ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_movie).collect()
    }

    async fn page_movies(&self, page: PageRequest) -> Result<Vec<Movie>, StoreError> {
        let (limit, offset) = page_bounds(page);
        let rows = sqlx::query("SELECT * FROM movies ORDER BY created_at ASC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_movie).collect()
    }

    async fn count_movies(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        to_u64(count, "count")
    }
}

#[async_trait]
impl ShowRepository for PostgresTicketStore {
    async fn insert_show(&self, show: &Show) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO shows (show_id, movie_id, show_date, show_time, show_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(show.id.0)
        .bind(show.movie_id.0)
        .bind(&show.show_date)
        .bind(&show.show_time)
        .bind(to_i64(show.show_price.as_u64(), "show_price")?)
        .bind(show.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("show {}", show.id)))?;
        Ok(())
    }

    async fn get_show(&self, id: ShowId) -> Result<Option<Show>, StoreError> {
        let row = sqlx::query("SELECT * FROM shows WHERE show_id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_show).transpose()
    }

    async fn update_show(&self, show: &Show) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE shows SET movie_id = $2, show_date = $3, show_time = $4, show_price = $5
            WHERE show_id = $1
            "#,
        )
        .bind(show.id.0)
        .bind(show.movie_id.0)
        .bind(&show.show_date)
        .bind(&show.show_time)
        .bind(to_i64(show.show_price.as_u64(), "show_price")?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("show"));
        }
        Ok(())
    }

    async fn delete_show(&self, id: ShowId) -> Result<bool, StoreError> {
        // seats go with the show via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM shows WHERE show_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_shows(&self) -> Result<Vec<Show>, StoreError> {
        let rows = sqlx::query("SELECT * FROM shows ORDER BY show_date ASC, show_time ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_show).collect()
    }

    async fn list_shows_by_movie(&self, movie_id: MovieId) -> Result<Vec<Show>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM shows WHERE movie_id = $1 ORDER BY show_date ASC, show_time ASC",
        )
        .bind(movie_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_show).collect()
    }

    async fn delete_shows_by_movie(&self, movie_id: MovieId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM shows WHERE movie_id = $1")
            .bind(movie_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SeatRepository for PostgresTicketStore {
    async fn insert_seats(&self, seats: &[Seat]) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO seats (seat_id, show_id, seat_no, available)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(seat.id.0)
            .bind(seat.show_id.0)
            .bind(&seat.seat_no)
            .bind(seat.available)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_err(e, || format!("seat {}", seat.seat_no)))?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_seats_by_show(&self, show_id: ShowId) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query("SELECT * FROM seats WHERE show_id = $1 ORDER BY seat_seq ASC")
            .bind(show_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_seat).collect()
    }

    async fn get_seats(&self, ids: &[SeatId]) -> Result<Vec<Seat>, StoreError> {
        let rows = sqlx::query("SELECT * FROM seats WHERE seat_id = ANY($1) ORDER BY seat_seq ASC")
            .bind(seat_uuids(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_seat).collect()
    }

    async fn set_seat_availability(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        available: bool,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let touched: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE seats SET available = $3
            WHERE show_id = $1 AND seat_id = ANY($2)
            RETURNING seat_id
            "#,
        )
        .bind(show_id.0)
        .bind(seat_uuids(seat_ids))
        .bind(available)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        if touched.len() != seat_ids.len() {
            let missing = seat_ids
                .iter()
                .copied()
                .filter(|id| !touched.contains(&id.0))
                .collect();
            // dropping the transaction rolls back the partial update
            return Err(StoreError::SeatsUnavailable { seat_ids: missing });
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

impl PostgresTicketStore {
    async fn booking_status_of(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: BookingId,
    ) -> Result<BookingStatus, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE booking_id = $1")
                .bind(id.0)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err)?;
        let status = status.ok_or(StoreError::NotFound("booking"))?;
        status
            .parse::<BookingStatus>()
            .map_err(|_| invalid("status", &status))
    }

    async fn transition_booking(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE bookings SET status = $3, updated_at = $4
            WHERE booking_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id.0)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => row_to_booking(&row),
            None => {
                let actual = self.booking_status_of(tx, id).await?;
                Err(StoreError::StatusMismatch {
                    expected: expected.as_str().to_string(),
                    actual: actual.as_str().to_string(),
                })
            }
        }
    }

    async fn transition_payment(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        pidx: &str,
        next: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE payments SET status = $2, transaction_id = COALESCE($3, transaction_id),
                updated_at = $4
            WHERE pidx = $1 AND status = 'initiated'
            RETURNING *
            "#,
        )
        .bind(pidx)
        .bind(next.as_str())
        .bind(transaction_id)
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        if let Some(row) = row {
            return row_to_payment(&row);
        }
        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM payments WHERE pidx = $1")
            .bind(pidx)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        match actual {
            Some(actual) => Err(StoreError::StatusMismatch {
                expected: PaymentStatus::Initiated.as_str().to_string(),
                actual,
            }),
            None => Err(StoreError::NotFound("payment")),
        }
    }
}

#[async_trait]
impl BookingRepository for PostgresTicketStore {
    async fn reserve_and_insert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let requested = seat_uuids(&booking.seats);
        let mut tx = self.begin().await?;
        let reserved: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE seats SET available = FALSE
            WHERE show_id = $1 AND seat_id = ANY($2) AND available
            RETURNING seat_id
            "#,
        )
        .bind(booking.show_id.0)
        .bind(&requested)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        if reserved.len() != requested.len() {
            let unavailable: Vec<SeatId> = booking
                .seats
                .iter()
                .copied()
                .filter(|id| !reserved.contains(&id.0))
                .collect();
            debug!(
                booking_id = %booking.id,
                unavailable = unavailable.len(),
                "seat reservation rolled back"
            );
            return Err(StoreError::SeatsUnavailable {
                seat_ids: unavailable,
            });
        }
        sqlx::query(
            r#"
            INSERT INTO bookings (
                booking_id, user_id, show_id, seat_ids, price, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id.0)
        .bind(booking.user_id.0)
        .bind(booking.show_id.0)
        .bind(&requested)
        .bind(to_i64(booking.price.as_u64(), "price")?)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_err(e, || format!("booking {}", booking.id)))?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE booking_id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bookings ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn count_bookings(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        to_u64(count, "count")
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut tx = self.begin().await?;
        let booking = self.transition_booking(&mut tx, id, expected, next).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(booking)
    }

    async fn cancel_booking(
        &self,
        id: BookingId,
        expected: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut tx = self.begin().await?;
        let booking = self
            .transition_booking(&mut tx, id, expected, BookingStatus::Cancelled)
            .await?;
        sqlx::query("UPDATE seats SET available = TRUE WHERE seat_id = ANY($1)")
            .bind(seat_uuids(&booking.seats))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(booking)
    }
}

#[async_trait]
impl PaymentRepository for PostgresTicketStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, booking_id, user_id, pidx, amount_paisa, status, transaction_id,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id.0)
        .bind(payment.booking_id.0)
        .bind(payment.user_id.0)
        .bind(&payment.pidx)
        .bind(to_i64(payment.amount_paisa, "amount_paisa")?)
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, || format!("payment {}", payment.pidx)))?;
        Ok(())
    }

    async fn get_payment_by_pidx(&self, pidx: &str) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query("SELECT * FROM payments WHERE pidx = $1")
            .bind(pidx)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn list_payments_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at ASC")
                .bind(booking_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.iter().map(row_to_payment).collect()
    }

    async fn complete_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError> {
        let mut tx = self.begin().await?;
        let payment = self
            .transition_payment(&mut tx, pidx, PaymentStatus::Completed, transaction_id)
            .await?;
        self.transition_booking(
            &mut tx,
            payment.booking_id,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
        )
        .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(payment)
    }

    async fn complete_unbooked_payment(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, StoreError> {
        let mut tx = self.begin().await?;
        let payment = self
            .transition_payment(&mut tx, pidx, PaymentStatus::Completed, transaction_id)
            .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(payment)
    }

    async fn fail_payment(&self, pidx: &str) -> Result<Payment, StoreError> {
        let mut tx = self.begin().await?;
        let payment = self
            .transition_payment(&mut tx, pidx, PaymentStatus::Failed, None)
            .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(payment)
    }
}

#[async_trait]
impl ContactRepository for PostgresTicketStore {
    async fn insert_contact(&self, message: &ContactMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contact_messages (contact_id, name, email, subject, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id.0)
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.subject)
        .bind(&message.message)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactMessage>, StoreError> {
        let rows = sqlx::query("SELECT * FROM contact_messages ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_contact).collect()
    }
}
