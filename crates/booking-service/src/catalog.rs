use std::{collections::HashSet, sync::Arc};

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use ticket_domain::{
    Movie, MovieId, PageRequest, Rupees, Seat, SeatId, Show, ShowId, seat_labels,
};
use ticket_store::{StoreError, TicketStore};
use tracing::{info, warn};

use crate::context::Actor;
use crate::error::ServiceError;

pub const MAX_PAGE_LIMIT: usize = 100;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Default)]
pub struct MovieInput {
    pub movie_name: String,
    pub movie_genre: String,
    pub movie_details: String,
    pub movie_rated: String,
    pub movie_duration: String,
    pub movie_poster_image: String,
}

#[derive(Debug, Clone, Default)]
pub struct MovieUpdate {
    pub movie_name: Option<String>,
    pub movie_genre: Option<String>,
    pub movie_details: Option<String>,
    pub movie_rated: Option<String>,
    pub movie_duration: Option<String>,
    pub movie_poster_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShowInput {
    pub movie_id: MovieId,
    pub show_date: String,
    pub show_time: String,
    pub price: u64,
    pub seat_rows: Option<u32>,
    pub seats_per_row: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ShowUpdate {
    pub movie_id: Option<MovieId>,
    pub show_date: Option<String>,
    pub show_time: Option<String>,
    pub price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedShow {
    pub show: Show,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviePage {
    pub movies: Vec<Movie>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

/// Movies, their shows and each show's seats. Writes are admin-only.
pub struct CatalogService {
    store: Arc<dyn TicketStore>,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub async fn create_movie(
        &self,
        actor: &Actor,
        input: MovieInput,
    ) -> Result<Movie, ServiceError> {
        actor.require_admin()?;
        let movie = Movie {
            id: MovieId::new(),
            movie_name: required(input.movie_name)?,
            movie_genre: required(input.movie_genre)?,
            movie_details: required(input.movie_details)?,
            movie_rated: required(input.movie_rated)?,
            movie_duration: required(input.movie_duration)?,
            movie_poster_image: input.movie_poster_image.trim().to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_movie(&movie).await?;
        info!(movie_id = %movie.id, name = %movie.movie_name, "movie created");
        Ok(movie)
    }

    pub async fn list_movies(&self) -> Result<Vec<Movie>, ServiceError> {
        Ok(self.store.list_movies().await?)
    }

    pub async fn get_movie(&self, id: MovieId) -> Result<Movie, ServiceError> {
        self.store
            .get_movie(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Movie not found"))
    }

    pub async fn update_movie(
        &self,
        actor: &Actor,
        id: MovieId,
        update: MovieUpdate,
    ) -> Result<Movie, ServiceError> {
        actor.require_admin()?;
        let mut movie = self.get_movie(id).await?;
        let fields = [
            (update.movie_name, &mut movie.movie_name),
            (update.movie_genre, &mut movie.movie_genre),
            (update.movie_details, &mut movie.movie_details),
            (update.movie_rated, &mut movie.movie_rated),
            (update.movie_duration, &mut movie.movie_duration),
        ];
        for (value, slot) in fields {
            if let Some(value) = value.map(|v| v.trim().to_string()) {
                if value.is_empty() {
                    return Err(ServiceError::bad_request("Movie fields cannot be empty"));
                }
                *slot = value;
            }
        }
        if let Some(poster) = update.movie_poster_image {
            movie.movie_poster_image = poster.trim().to_string();
        }
        self.store.update_movie(&movie).await?;
        info!(movie_id = %movie.id, "movie updated");
        Ok(movie)
    }

    /// Shows of the movie and their seats go with it. Bookings stay.
    pub async fn delete_movie(&self, actor: &Actor, id: MovieId) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let shows = self.store.delete_shows_by_movie(id).await?;
        if !self.store.delete_movie(id).await? {
            return Err(ServiceError::not_found("Movie not found"));
        }
        info!(movie_id = %id, shows, "movie deleted");
        Ok(())
    }

    pub async fn paginate_movies(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<MoviePage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::bad_request("Page must be at least 1"));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ServiceError::bad_request(format!(
                "Limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        let movies = self
            .store
            .page_movies(PageRequest::from_page(page, limit))
            .await?;
        let total = self.store.count_movies().await?;
        Ok(MoviePage {
            movies,
            total,
            page,
            limit,
        })
    }

    pub async fn count_movies(&self) -> Result<u64, ServiceError> {
        Ok(self.store.count_movies().await?)
    }

    pub async fn create_show(
        &self,
        actor: &Actor,
        input: ShowInput,
    ) -> Result<CreatedShow, ServiceError> {
        actor.require_admin()?;
        self.get_movie(input.movie_id).await?;
        let show = Show {
            id: ShowId::new(),
            movie_id: input.movie_id,
            show_date: parse_show_date(&input.show_date)?,
            show_time: parse_show_time(&input.show_time)?,
            show_price: positive_price(input.price)?,
            created_at: Utc::now(),
        };
        let labels = match (input.seat_rows, input.seats_per_row) {
            (Some(rows), Some(per_row)) => seat_labels(rows, per_row)?,
            (None, None) => Vec::new(),
            _ => {
                return Err(ServiceError::bad_request(
                    "seatRows and seatsPerRow must be given together",
                ));
            }
        };

        self.store.insert_show(&show).await?;
        let seats: Vec<Seat> = labels
            .into_iter()
            .map(|label| Seat::new(show.id, label))
            .collect();
        if !seats.is_empty() {
            if let Err(err) = self.store.insert_seats(&seats).await {
                if let Err(cleanup) = self.store.delete_show(show.id).await {
                    warn!(show_id = %show.id, error = %cleanup, "failed to roll back show");
                }
                return Err(err.into());
            }
        }
        info!(show_id = %show.id, movie_id = %show.movie_id, seats = seats.len(), "show created");
        Ok(CreatedShow { show, seats })
    }

    pub async fn list_shows(&self) -> Result<Vec<Show>, ServiceError> {
        Ok(self.store.list_shows().await?)
    }

    pub async fn list_shows_by_movie(&self, movie_id: MovieId) -> Result<Vec<Show>, ServiceError> {
        Ok(self.store.list_shows_by_movie(movie_id).await?)
    }

    pub async fn get_show(&self, id: ShowId) -> Result<Show, ServiceError> {
        self.store
            .get_show(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Show not found"))
    }

    pub async fn update_show(
        &self,
        actor: &Actor,
        id: ShowId,
        update: ShowUpdate,
    ) -> Result<Show, ServiceError> {
        actor.require_admin()?;
        let mut show = self.get_show(id).await?;
        if let Some(movie_id) = update.movie_id {
            self.get_movie(movie_id).await?;
            show.movie_id = movie_id;
        }
        if let Some(date) = update.show_date {
            show.show_date = parse_show_date(&date)?;
        }
        if let Some(time) = update.show_time {
            show.show_time = parse_show_time(&time)?;
        }
        if let Some(price) = update.price {
            show.show_price = positive_price(price)?;
        }
        self.store.update_show(&show).await?;
        info!(show_id = %show.id, "show updated");
        Ok(show)
    }

    pub async fn delete_show(&self, actor: &Actor, id: ShowId) -> Result<(), ServiceError> {
        actor.require_admin()?;
        if !self.store.delete_show(id).await? {
            return Err(ServiceError::not_found("Show not found"));
        }
        info!(show_id = %id, "show deleted");
        Ok(())
    }

    pub async fn add_seats(
        &self,
        actor: &Actor,
        show_id: ShowId,
        seat_nos: Vec<String>,
    ) -> Result<Vec<Seat>, ServiceError> {
        actor.require_admin()?;
        self.get_show(show_id).await?;
        let labels: Vec<String> = seat_nos
            .into_iter()
            .map(|label| label.trim().to_uppercase())
            .collect();
        if labels.is_empty() || labels.iter().any(String::is_empty) {
            return Err(ServiceError::bad_request("Please provide seat numbers"));
        }
        let mut seen = HashSet::new();
        if !labels.iter().all(|label| seen.insert(label.as_str())) {
            return Err(ServiceError::bad_request("Duplicate seat numbers in request"));
        }
        let seats: Vec<Seat> = labels
            .into_iter()
            .map(|label| Seat::new(show_id, label))
            .collect();
        match self.store.insert_seats(&seats).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ServiceError::Conflict("Seat already exists".to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        info!(show_id = %show_id, seats = seats.len(), "seats added");
        Ok(seats)
    }

    pub async fn seats_by_show(&self, show_id: ShowId) -> Result<Vec<Seat>, ServiceError> {
        self.get_show(show_id).await?;
        Ok(self.store.list_seats_by_show(show_id).await?)
    }

    /// Admin override; booking creation reserves seats on its own.
    pub async fn set_seat_availability(
        &self,
        actor: &Actor,
        show_id: ShowId,
        seat_ids: &[SeatId],
        available: bool,
    ) -> Result<Vec<Seat>, ServiceError> {
        actor.require_admin()?;
        if seat_ids.is_empty() {
            return Err(ServiceError::bad_request("Please select seats"));
        }
        self.get_show(show_id).await?;
        self.store
            .set_seat_availability(show_id, seat_ids, available)
            .await?;
        info!(show_id = %show_id, seats = seat_ids.len(), available, "seat availability set");
        Ok(self.store.get_seats(seat_ids).await?)
    }
}

fn required(value: String) -> Result<String, ServiceError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ServiceError::bad_request("Please enter all fields"));
    }
    Ok(value)
}

fn parse_show_date(value: &str) -> Result<String, ServiceError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map(|date| date.format(DATE_FORMAT).to_string())
        .map_err(|_| ServiceError::bad_request("Show date must be in YYYY-MM-DD format"))
}

fn parse_show_time(value: &str) -> Result<String, ServiceError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(|time| time.format(TIME_FORMAT).to_string())
        .map_err(|_| ServiceError::bad_request("Show time must be in HH:MM format"))
}

fn positive_price(price: u64) -> Result<Rupees, ServiceError> {
    if price == 0 {
        return Err(ServiceError::bad_request("Price must be greater than zero"));
    }
    Ok(Rupees(price))
}

#[cfg(test)]
mod tests {
    use ticket_domain::UserId;
    use ticket_store::SeatRepository;

    use super::*;
    use crate::test_support::{fixture, movie_input};

    fn admin() -> Actor {
        Actor::admin(UserId::new())
    }

    fn show_input(movie_id: MovieId) -> ShowInput {
        ShowInput {
            movie_id,
            show_date: "2026-11-02".to_string(),
            show_time: "18:30".to_string(),
            price: 350,
            seat_rows: Some(2),
            seats_per_row: Some(5),
        }
    }

    #[tokio::test]
    async fn catalog_writes_require_admin() {
        let fx = fixture();
        let err = fx
            .services
            .catalog
            .create_movie(&Actor::user(UserId::new()), movie_input("Jatra"))
            .await
            .expect_err("forbidden");
        assert_eq!(err.to_string(), "Access denied. Admin privileges required.");
        assert!(fx.services.catalog.list_movies().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn movie_requires_core_fields() {
        let fx = fixture();
        let mut input = movie_input("Jatra");
        input.movie_genre = " ".to_string();
        assert!(matches!(
            fx.services.catalog.create_movie(&admin(), input).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn show_with_layout_gets_seats() {
        let fx = fixture();
        let movie = fx
            .services
            .catalog
            .create_movie(&admin(), movie_input("Jatra"))
            .await
            .expect("movie");
        let created = fx
            .services
            .catalog
            .create_show(&admin(), show_input(movie.id))
            .await
            .expect("show");
        assert_eq!(created.seats.len(), 10);
        assert_eq!(created.show.show_price, Rupees(350));
        let seats = fx
            .services
            .catalog
            .seats_by_show(created.show.id)
            .await
            .expect("seats");
        assert_eq!(seats.first().map(|s| s.seat_no.as_str()), Some("A1"));
        assert!(seats.iter().all(|seat| seat.available));
    }

    #[tokio::test]
    async fn show_validation_rejects_bad_date_time_price_and_movie() {
        let fx = fixture();
        let movie = fx
            .services
            .catalog
            .create_movie(&admin(), movie_input("Jatra"))
            .await
            .expect("movie");

        let mut bad_date = show_input(movie.id);
        bad_date.show_date = "02/11/2026".to_string();
        let mut bad_time = show_input(movie.id);
        bad_time.show_time = "25:00".to_string();
        let mut free = show_input(movie.id);
        free.price = 0;
        let mut half_layout = show_input(movie.id);
        half_layout.seats_per_row = None;

        for input in [bad_date, bad_time, free, half_layout] {
            assert!(matches!(
                fx.services.catalog.create_show(&admin(), input).await,
                Err(ServiceError::BadRequest(_))
            ));
        }
        assert!(matches!(
            fx.services
                .catalog
                .create_show(&admin(), show_input(MovieId::new()))
                .await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(fx.services.catalog.list_shows().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn deleting_movie_removes_its_shows_and_seats() {
        let fx = fixture();
        let movie = fx
            .services
            .catalog
            .create_movie(&admin(), movie_input("Jatra"))
            .await
            .expect("movie");
        let created = fx
            .services
            .catalog
            .create_show(&admin(), show_input(movie.id))
            .await
            .expect("show");
        fx.services
            .catalog
            .delete_movie(&admin(), movie.id)
            .await
            .expect("delete");

        assert!(
            fx.services
                .catalog
                .list_shows_by_movie(movie.id)
                .await
                .expect("shows")
                .is_empty()
        );
        assert!(
            fx.store
                .list_seats_by_show(created.show.id)
                .await
                .expect("seats")
                .is_empty()
        );
        assert!(matches!(
            fx.services.catalog.delete_movie(&admin(), movie.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pagination_bounds_are_enforced() {
        let fx = fixture();
        for name in ["A", "B", "C"] {
            fx.services
                .catalog
                .create_movie(&admin(), movie_input(name))
                .await
                .expect("movie");
        }
        let page = fx.services.catalog.paginate_movies(2, 2).await.expect("page");
        assert_eq!(page.movies.len(), 1);
        assert_eq!(page.total, 3);
        assert!(fx.services.catalog.paginate_movies(0, 2).await.is_err());
        assert!(fx.services.catalog.paginate_movies(1, 101).await.is_err());
        assert_eq!(fx.services.catalog.count_movies().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn added_seats_must_be_unique() {
        let fx = fixture();
        let movie = fx
            .services
            .catalog
            .create_movie(&admin(), movie_input("Jatra"))
            .await
            .expect("movie");
        let mut input = show_input(movie.id);
        input.seat_rows = None;
        input.seats_per_row = None;
        let show = fx
            .services
            .catalog
            .create_show(&admin(), input)
            .await
            .expect("show")
            .show;

        let seats = fx
            .services
            .catalog
            .add_seats(&admin(), show.id, vec!["a1".to_string(), "A2".to_string()])
            .await
            .expect("seats");
        assert_eq!(seats[0].seat_no, "A1");
        assert!(matches!(
            fx.services
                .catalog
                .add_seats(&admin(), show.id, vec!["B1".to_string(), "b1".to_string()])
                .await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            fx.services
                .catalog
                .add_seats(&admin(), show.id, vec!["A2".to_string()])
                .await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn availability_override_is_all_or_nothing() {
        let fx = fixture();
        let movie = fx
            .services
            .catalog
            .create_movie(&admin(), movie_input("Jatra"))
            .await
            .expect("movie");
        let created = fx
            .services
            .catalog
            .create_show(&admin(), show_input(movie.id))
            .await
            .expect("show");
        let ids = vec![created.seats[0].id, SeatId::new()];
        assert!(matches!(
            fx.services
                .catalog
                .set_seat_availability(&admin(), created.show.id, &ids, false)
                .await,
            Err(ServiceError::SeatsUnavailable { .. })
        ));
        assert!(
            fx.services
                .catalog
                .seats_by_show(created.show.id)
                .await
                .expect("seats")
                .iter()
                .all(|seat| seat.available)
        );

        let updated = fx
            .services
            .catalog
            .set_seat_availability(&admin(), created.show.id, &ids[..1], false)
            .await
            .expect("override");
        assert!(!updated[0].available);
    }
}
