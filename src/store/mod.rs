//! Хранилище бронирований и журнал отложенных компенсаций.

pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Booking, NewBooking, PendingCompensation};

pub use postgres::{PgBookingStore, PgCompensationOutbox};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("booking code '{0}' already exists")]
    DuplicateBookingCode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Сохраняет бронь со статусом `active`. Уникальность кода гарантирует хранилище.
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError>;

    /// Атомарно переводит `active -> used`. `None`, если кода нет или он уже погашен.
    async fn redeem(&self, booking_code: &str) -> Result<Option<Booking>, StoreError>;

    async fn list_for_requester(&self, requester_id: i64) -> Result<Vec<Booking>, StoreError>;
}

/// Журнал компенсаций, которые не удалось выполнить в момент сбоя саги.
/// Записи идемпотентны по коду брони.
#[async_trait]
pub trait CompensationOutbox: Send + Sync {
    async fn record(&self, booking_code: &str, seat_ids: &[i64], error: &str) -> Result<(), StoreError>;

    /// До `limit` записей по возрастанию `updated_at`.
    async fn pending(&self, limit: i64) -> Result<Vec<PendingCompensation>, StoreError>;

    async fn resolve(&self, booking_code: &str) -> Result<(), StoreError>;
}
