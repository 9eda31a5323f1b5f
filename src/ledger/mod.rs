//! Реестр мест (Seat Inventory Ledger).
//!
//! Единственный владелец флага `is_available`. Все изменения проходят через
//! [`SeatLedger::reserve`] и [`SeatLedger::release`]; атомарность обеспечивается
//! транзакцией хранилища, а не блокировками внутри процесса.
//!
//! Каждый резерв помечается держателем (для саги это код брони). Освобождение
//! снимает только места, которые все еще принадлежат тому же держателю, поэтому
//! запоздалый повтор компенсации не может освободить места чужой брони.

pub mod postgres;
pub mod remote;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::models::{Seat, Studio};

pub use postgres::PgSeatLedger;
pub use remote::HttpSeatLedger;

/// Результат резервирования. `Unavailable` - нормальный бизнес-исход, а не ошибка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("seat store error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cinema service error: {0}")]
    Upstream(String),
    #[error("circuit breaker is open - cinema service temporarily unavailable")]
    CircuitOpen,
}

#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Все или ничего: либо все места становятся недоступными и закрепляются
    /// за `holder`, либо ни одно не меняется.
    async fn reserve(&self, seat_ids: &[i64], holder: &str) -> Result<ReserveOutcome, LedgerError>;

    /// Идемпотентно и только для своих мест: места другого держателя и
    /// свободные места не меняются.
    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError>;

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError>;

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError>;
}

/// Дедуплицирует и сортирует id мест. Порядок по возрастанию задает порядок
/// блокировок строк, поэтому пересекающиеся пакеты не взаимоблокируются.
pub fn normalize_seat_ids(seat_ids: &[i64]) -> Vec<i64> {
    seat_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Убирает повторы, сохраняя порядок, в котором места выбрал покупатель.
pub fn dedup_seat_ids(seat_ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(seat_ids.len());
    seat_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_and_dedups() {
        assert_eq!(normalize_seat_ids(&[5, 1, 3, 1, 5]), vec![1, 3, 5]);
        assert!(normalize_seat_ids(&[]).is_empty());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        assert_eq!(dedup_seat_ids(&[5, 1, 3, 1, 5]), vec![5, 1, 3]);
    }
}
