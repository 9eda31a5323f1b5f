use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Держатель резерва (reserved_by) наружу не отдается: для саги это код брони
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: i64,
    pub studio_id: i64,
    pub seat_number: String,
    // Единственный источник истины о доступности; меняется только через SeatLedger
    pub is_available: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Studio {
    pub id: i64,
    pub name: String,
    pub total_seats: i32,
    pub created_at: DateTime<Utc>,
}
