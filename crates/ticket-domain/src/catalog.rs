use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{MovieId, SeatId, ShowId};
use crate::money::Rupees;

pub const MAX_SEAT_ROWS: u32 = 26;
pub const MAX_SEATS_PER_ROW: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(rename = "_id")]
    pub id: MovieId,
    pub movie_name: String,
    pub movie_genre: String,
    pub movie_details: String,
    pub movie_rated: String,
    pub movie_duration: String,
    pub movie_poster_image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    #[serde(rename = "_id")]
    pub id: ShowId,
    pub movie_id: MovieId,
    pub show_date: String,
    pub show_time: String,
    pub show_price: Rupees,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    #[serde(rename = "_id")]
    pub id: SeatId,
    pub show_id: ShowId,
    pub seat_no: String,
    pub available: bool,
}

impl Seat {
    #[must_use]
    pub fn new(show_id: ShowId, seat_no: impl Into<String>) -> Self {
        Self {
            id: SeatId::new(),
            show_id,
            seat_no: seat_no.into(),
            available: true,
        }
    }
}

/// Labels for a rectangular hall: rows `A..`, seats `1..` within a row.
pub fn seat_labels(rows: u32, per_row: u32) -> Result<Vec<String>, DomainError> {
    if rows == 0 || rows > MAX_SEAT_ROWS {
        return Err(DomainError::InvalidSeatLayout(format!(
            "rows must be between 1 and {MAX_SEAT_ROWS}"
        )));
    }
    if per_row == 0 || per_row > MAX_SEATS_PER_ROW {
        return Err(DomainError::InvalidSeatLayout(format!(
            "seats per row must be between 1 and {MAX_SEATS_PER_ROW}"
        )));
    }
    let mut labels = Vec::with_capacity((rows * per_row) as usize);
    for row in 0..rows {
        let letter = char::from(b'A' + row as u8);
        for number in 1..=per_row {
            labels.push(format!("{letter}{number}"));
        }
    }
    Ok(labels)
}
