use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;

/// Канал продажи: сайт (online) или касса (offline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingChannel {
    Online,
    Offline,
}

/// Статус билета. Единственный переход: `Active -> Used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Used,
}

#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl BookingChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingChannel::Online => "online",
            BookingChannel::Offline => "offline",
        }
    }
}

impl TryFrom<String> for BookingChannel {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "online" => Ok(BookingChannel::Online),
            "offline" => Ok(BookingChannel::Offline),
            _ => Err(UnknownVariant { kind: "booking channel", value }),
        }
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Used => "used",
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(BookingStatus::Active),
            "used" => Ok(BookingStatus::Used),
            _ => Err(UnknownVariant { kind: "booking status", value }),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub booking_code: String,
    pub requester_id: Option<i64>,
    pub holder_name: String,
    pub holder_email: String,
    pub studio_id: i64,
    pub seat_ids: Vec<i64>,
    pub ticket_payload: String,
    #[sqlx(try_from = "String")]
    pub channel: BookingChannel,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Данные для вставки новой брони; id и временные метки назначает хранилище.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_code: String,
    pub requester_id: Option<i64>,
    pub holder_name: String,
    pub holder_email: String,
    pub studio_id: i64,
    pub seat_ids: Vec<i64>,
    pub ticket_payload: String,
    pub channel: BookingChannel,
}

/// Что видит контролер при успешном погашении билета.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub booking_code: String,
    pub studio_id: i64,
    pub seat_ids: Vec<i64>,
    pub customer_name: String,
    pub booking_type: BookingChannel,
}

impl From<&Booking> for BookingSummary {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_code: booking.booking_code.clone(),
            studio_id: booking.studio_id,
            seat_ids: booking.seat_ids.clone(),
            customer_name: booking.holder_name.clone(),
            booking_type: booking.channel,
        }
    }
}

/// Компенсация (освобождение мест), которую не удалось выполнить сразу.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct PendingCompensation {
    pub booking_code: String,
    pub seat_ids: Vec<i64>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
