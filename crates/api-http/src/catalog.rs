use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use booking_service::{CreatedShow, MovieInput, MoviePage, MovieUpdate, ShowInput, ShowUpdate};
use platform_core::ResponseEnvelope;
use serde::{Deserialize, Serialize};
use ticket_domain::{Movie, MovieId, Seat, SeatId, Show, ShowId};
use tracing::info;

use crate::{AdminUser, ApiError, ApiResult, AppState, JsonBody, done, ok, parse_id};

const DEFAULT_PAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovieRequest {
    pub movie_name: String,
    pub movie_genre: String,
    pub movie_details: String,
    pub movie_rated: String,
    pub movie_duration: String,
    pub movie_poster_image: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovieUpdateRequest {
    pub movie_name: Option<String>,
    pub movie_genre: Option<String>,
    pub movie_details: Option<String>,
    pub movie_rated: Option<String>,
    pub movie_duration: Option<String>,
    pub movie_poster_image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShowRequest {
    pub movie_id: String,
    pub show_date: String,
    pub show_time: String,
    pub show_price: u64,
    pub seat_rows: Option<u32>,
    pub seats_per_row: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShowUpdateRequest {
    pub movie_id: Option<String>,
    pub show_date: Option<String>,
    pub show_time: Option<String>,
    pub show_price: Option<u64>,
}

/// Accepts a single `seatNo` or a `seatNos` list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeatRequest {
    pub show_id: String,
    pub seat_no: Option<String>,
    pub seat_nos: Vec<String>,
}

/// Also accepts the booking body (`show`, `seats`), which marks the seats
/// unavailable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetAvailableRequest {
    #[serde(alias = "show")]
    pub show_id: String,
    #[serde(alias = "seats")]
    pub seat_ids: Vec<String>,
    pub available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoviePayload {
    pub movie: Movie,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoviesPayload {
    pub movies: Vec<Movie>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieCountPayload {
    pub movie_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowPayload {
    pub show: Show,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowsPayload {
    pub shows: Vec<Show>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatsPayload {
    pub seats: Vec<Seat>,
}

pub(crate) fn page_number(raw: Option<&str>, default: usize, what: &str) -> Result<usize, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::bad_request(format!("{what} must be a positive integer"))),
    }
}

fn seat_ids(raw: &[String]) -> Result<Vec<SeatId>, ApiError> {
    raw.iter().map(|id| parse_id(id, "seat")).collect()
}

pub async fn create_movie(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    JsonBody(body): JsonBody<MovieRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<MoviePayload>>), ApiError> {
    info!(route = "/api/movie/create", "api http request");
    let movie = state
        .services
        .catalog
        .create_movie(
            &actor,
            MovieInput {
                movie_name: body.movie_name,
                movie_genre: body.movie_genre,
                movie_details: body.movie_details,
                movie_rated: body.movie_rated,
                movie_duration: body.movie_duration,
                movie_poster_image: body.movie_poster_image,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ok("Movie created successfully", MoviePayload { movie }),
    ))
}

pub async fn get_all_movies(State(state): State<AppState>) -> ApiResult<MoviesPayload> {
    info!(route = "/api/movie/get_all_movies", "api http request");
    let movies = state.services.catalog.list_movies().await?;
    Ok(ok("Movies fetched successfully", MoviesPayload { movies }))
}

pub async fn get_single_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MoviePayload> {
    info!(route = "/api/movie/get_single_movie/{id}", movie_id = %id, "api http request");
    let movie = state
        .services
        .catalog
        .get_movie(parse_id::<MovieId>(&id, "movie")?)
        .await?;
    Ok(ok("Movie fetched successfully", MoviePayload { movie }))
}

pub async fn update_movie(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<MovieUpdateRequest>,
) -> ApiResult<MoviePayload> {
    info!(route = "/api/movie/update_movie/{id}", movie_id = %id, "api http request");
    let movie = state
        .services
        .catalog
        .update_movie(
            &actor,
            parse_id(&id, "movie")?,
            MovieUpdate {
                movie_name: body.movie_name,
                movie_genre: body.movie_genre,
                movie_details: body.movie_details,
                movie_rated: body.movie_rated,
                movie_duration: body.movie_duration,
                movie_poster_image: body.movie_poster_image,
            },
        )
        .await?;
    Ok(ok("Movie updated successfully", MoviePayload { movie }))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    info!(route = "/api/movie/delete_movie/{id}", movie_id = %id, "api http request");
    state
        .services
        .catalog
        .delete_movie(&actor, parse_id(&id, "movie")?)
        .await?;
    Ok(done("Movie deleted successfully"))
}

pub async fn paginate_movies(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<MoviePage> {
    info!(route = "/api/movie/pagination", "api http request");
    let page = page_number(query.page.as_deref(), 1, "page")?;
    let limit = page_number(query.limit.as_deref(), DEFAULT_PAGE_LIMIT, "limit")?;
    let result = state.services.catalog.paginate_movies(page, limit).await?;
    Ok(ok("Movies fetched successfully", result))
}

pub async fn get_movies_count(State(state): State<AppState>) -> ApiResult<MovieCountPayload> {
    info!(route = "/api/movie/get_movies_count", "api http request");
    let movie_count = state.services.catalog.count_movies().await?;
    Ok(ok(
        "Movie count fetched successfully",
        MovieCountPayload { movie_count },
    ))
}

pub async fn create_show(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    JsonBody(body): JsonBody<ShowRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<CreatedShow>>), ApiError> {
    info!(route = "/api/shows/create", "api http request");
    let created = state
        .services
        .catalog
        .create_show(
            &actor,
            ShowInput {
                movie_id: parse_id(&body.movie_id, "movie")?,
                show_date: body.show_date,
                show_time: body.show_time,
                price: body.show_price,
                seat_rows: body.seat_rows,
                seats_per_row: body.seats_per_row,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ok("Show created successfully", created),
    ))
}

pub async fn get_all_shows(State(state): State<AppState>) -> ApiResult<ShowsPayload> {
    info!(route = "/api/shows/get_all", "api http request");
    let shows = state.services.catalog.list_shows().await?;
    Ok(ok("Shows fetched successfully", ShowsPayload { shows }))
}

pub async fn get_shows_by_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ShowsPayload> {
    info!(route = "/api/shows/get_by_movie/{id}", movie_id = %id, "api http request");
    let shows = state
        .services
        .catalog
        .list_shows_by_movie(parse_id(&id, "movie")?)
        .await?;
    Ok(ok("Shows fetched successfully", ShowsPayload { shows }))
}

pub async fn get_show_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ShowPayload> {
    info!(route = "/api/shows/get_by_id/{id}", show_id = %id, "api http request");
    let show = state
        .services
        .catalog
        .get_show(parse_id::<ShowId>(&id, "show")?)
        .await?;
    Ok(ok("Show fetched successfully", ShowPayload { show }))
}

pub async fn update_show(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ShowUpdateRequest>,
) -> ApiResult<ShowPayload> {
    info!(route = "/api/shows/{id}/update", show_id = %id, "api http request");
    let movie_id = body
        .movie_id
        .as_deref()
        .map(|raw| parse_id(raw, "movie"))
        .transpose()?;
    let show = state
        .services
        .catalog
        .update_show(
            &actor,
            parse_id(&id, "show")?,
            ShowUpdate {
                movie_id,
                show_date: body.show_date,
                show_time: body.show_time,
                price: body.show_price,
            },
        )
        .await?;
    Ok(ok("Show updated successfully", ShowPayload { show }))
}

pub async fn delete_show(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    info!(route = "/api/shows/delete/{id}", show_id = %id, "api http request");
    state
        .services
        .catalog
        .delete_show(&actor, parse_id(&id, "show")?)
        .await?;
    Ok(done("Show deleted successfully"))
}

pub async fn create_seats(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    JsonBody(body): JsonBody<SeatRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<SeatsPayload>>), ApiError> {
    info!(route = "/api/seat/create", "api http request");
    let mut seat_nos = body.seat_nos;
    seat_nos.extend(body.seat_no);
    let seats = state
        .services
        .catalog
        .add_seats(&actor, parse_id(&body.show_id, "show")?, seat_nos)
        .await?;
    Ok((
        StatusCode::CREATED,
        ok("Seat created successfully", SeatsPayload { seats }),
    ))
}

pub async fn get_seats_by_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SeatsPayload> {
    info!(route = "/api/seat/get_seats_by_show/{id}", show_id = %id, "api http request");
    let seats = state
        .services
        .catalog
        .seats_by_show(parse_id(&id, "show")?)
        .await?;
    Ok(ok("Seats fetched successfully", SeatsPayload { seats }))
}

pub async fn set_available(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    JsonBody(body): JsonBody<SetAvailableRequest>,
) -> ApiResult<SeatsPayload> {
    info!(route = "/api/seat/setavailable", available = body.available, "api http request");
    let ids = seat_ids(&body.seat_ids)?;
    let seats = state
        .services
        .catalog
        .set_seat_availability(&actor, parse_id(&body.show_id, "show")?, &ids, body.available)
        .await?;
    Ok(ok("Seats updated successfully", SeatsPayload { seats }))
}
