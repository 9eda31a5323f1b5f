use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use super::{BookingStore, CompensationOutbox, StoreError};
use crate::models::{Booking, NewBooking, PendingCompensation};

const BOOKING_COLUMNS: &str = "id, booking_code, requester_id, holder_name, holder_email, studio_id, \
     seat_ids, ticket_payload, channel, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let query = format!(
            "INSERT INTO bookings
                (booking_code, requester_id, holder_name, holder_email, studio_id,
                 seat_ids, ticket_payload, channel, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active')
             RETURNING {}",
            BOOKING_COLUMNS
        );

        sqlx::query_as::<_, Booking>(&query)
            .bind(&booking.booking_code)
            .bind(booking.requester_id)
            .bind(&booking.holder_name)
            .bind(&booking.holder_email)
            .bind(booking.studio_id)
            .bind(&booking.seat_ids)
            .bind(&booking.ticket_payload)
            .bind(booking.channel.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    warn!(booking_code = %booking.booking_code, "Booking code collision");
                    StoreError::DuplicateBookingCode(booking.booking_code.clone())
                }
                other => StoreError::Database(other),
            })
    }

    async fn redeem(&self, booking_code: &str) -> Result<Option<Booking>, StoreError> {
        // Один оператор = compare-and-swap по статусу: из N параллельных
        // погашений строку обновит только первое
        let query = format!(
            "UPDATE bookings
             SET status = 'used', updated_at = NOW()
             WHERE booking_code = $1 AND status = 'active'
             RETURNING {}",
            BOOKING_COLUMNS
        );

        let booking = sqlx::query_as::<_, Booking>(&query)
            .bind(booking_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_for_requester(&self, requester_id: i64) -> Result<Vec<Booking>, StoreError> {
        let query = format!(
            "SELECT {} FROM bookings WHERE requester_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        );

        let bookings = sqlx::query_as::<_, Booking>(&query)
            .bind(requester_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }
}

#[derive(Clone)]
pub struct PgCompensationOutbox {
    pool: PgPool,
}

impl PgCompensationOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompensationOutbox for PgCompensationOutbox {
    async fn record(&self, booking_code: &str, seat_ids: &[i64], error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_compensations (booking_code, seat_ids, attempts, last_error)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (booking_code) DO UPDATE
            SET attempts = pending_compensations.attempts + 1,
                last_error = EXCLUDED.last_error,
                updated_at = NOW()
            "#,
        )
        .bind(booking_code)
        .bind(seat_ids)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending(&self, limit: i64) -> Result<Vec<PendingCompensation>, StoreError> {
        // Давно не повторявшиеся первыми: каждая неудача сдвигает запись в конец
        let pending = sqlx::query_as::<_, PendingCompensation>(
            "SELECT booking_code, seat_ids, attempts, last_error, created_at, updated_at
             FROM pending_compensations
             ORDER BY updated_at
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn resolve(&self, booking_code: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_compensations WHERE booking_code = $1")
            .bind(booking_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
