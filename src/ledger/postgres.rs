use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{normalize_seat_ids, LedgerError, ReserveOutcome, SeatLedger};
use crate::models::{Seat, Studio};

/// Реестр мест поверх PostgreSQL.
#[derive(Clone)]
pub struct PgSeatLedger {
    pool: PgPool,
}

impl PgSeatLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatLedger for PgSeatLedger {
    async fn reserve(&self, seat_ids: &[i64], holder: &str) -> Result<ReserveOutcome, LedgerError> {
        let ids = normalize_seat_ids(seat_ids);
        if ids.is_empty() {
            return Ok(ReserveOutcome::Reserved);
        }

        let mut tx = self.pool.begin().await?;

        // Блокируем строки по возрастанию id: конкурирующие резервы пересекающихся
        // пакетов ждут здесь, и только один из них увидит место свободным
        let rows: Vec<(i64, bool)> = sqlx::query_as(
            "SELECT id, is_available FROM seats WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let all_available = rows.len() == ids.len() && rows.iter().all(|(_, available)| *available);
        if !all_available {
            tx.rollback().await?;
            debug!(seat_ids = ?ids, "Reserve rejected: seats unavailable or unknown");
            return Ok(ReserveOutcome::Unavailable);
        }

        sqlx::query(
            "UPDATE seats SET is_available = FALSE, reserved_by = $2, updated_at = NOW()
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(holder)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(seat_ids = ?ids, "Seats reserved");
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError> {
        let ids = normalize_seat_ids(seat_ids);
        if ids.is_empty() {
            return Ok(());
        }

        // Снимаются только места этого держателя; перепроданные под условие не попадают
        let released = sqlx::query(
            "UPDATE seats SET is_available = TRUE, reserved_by = NULL, updated_at = NOW()
             WHERE id = ANY($1) AND is_available = FALSE AND reserved_by = $2",
        )
        .bind(&ids)
        .bind(holder)
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!(seat_ids = ?ids, released, "Seats released");
        Ok(())
    }

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, studio_id, seat_number, is_available
             FROM seats
             WHERE studio_id = $1
             ORDER BY id",
        )
        .bind(studio_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError> {
        let studios = sqlx::query_as::<_, Studio>(
            "SELECT id, name, total_seats, created_at FROM studios ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(studios)
    }
}
