use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::CacheService;
use crate::ledger::SeatLedger;
use crate::models::PendingCompensation;
use crate::store::CompensationOutbox;

// Сколько освобождений выполняется одновременно за один проход
const RELEASE_CONCURRENCY: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Повторяет компенсации, которые сага не смогла выполнить сразу.
/// Освобождение идемпотентно и привязано к коду брони: если первая попытка
/// на самом деле прошла и места уже перепроданы, повтор их не тронет.
#[derive(Clone)]
pub struct CompensationReconciler {
    ledger: Arc<dyn SeatLedger>,
    outbox: Arc<dyn CompensationOutbox>,
    batch_size: i64,
    cache: Option<CacheService>,
}

impl CompensationReconciler {
    pub fn new(ledger: Arc<dyn SeatLedger>, outbox: Arc<dyn CompensationOutbox>, batch_size: i64) -> Self {
        Self {
            ledger,
            outbox,
            batch_size: batch_size.max(1),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Один проход по журналу: сначала записи, которые дольше всего не повторялись.
    pub async fn run_once(&self) -> ReconcileStats {
        let pending = match self.outbox.pending(self.batch_size).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to load pending compensations: {:?}", e);
                return ReconcileStats::default();
            }
        };

        if pending.is_empty() {
            debug!("🧾 No pending compensations");
            return ReconcileStats::default();
        }

        info!("🧾 Found {} pending compensations to retry", pending.len());

        let results: Vec<bool> = stream::iter(pending)
            .map(|entry| self.retry(entry))
            .buffer_unordered(RELEASE_CONCURRENCY)
            .collect()
            .await;

        let resolved = results.iter().filter(|ok| **ok).count();
        // В записи журнала нет зала, поэтому сбрасываем все схемы
        if resolved > 0 {
            if let Some(cache) = &self.cache {
                cache.invalidate_all_seats().await;
            }
        }
        let stats = ReconcileStats {
            attempted: results.len(),
            resolved,
            failed: results.len() - resolved,
        };
        info!(
            attempted = stats.attempted,
            resolved = stats.resolved,
            failed = stats.failed,
            "✅ Compensation pass completed"
        );
        stats
    }

    async fn retry(&self, entry: PendingCompensation) -> bool {
        match self.ledger.release(&entry.seat_ids, &entry.booking_code).await {
            Ok(()) => match self.outbox.resolve(&entry.booking_code).await {
                Ok(()) => {
                    info!(
                        booking_code = %entry.booking_code,
                        seat_ids = ?entry.seat_ids,
                        attempts = entry.attempts,
                        "Deferred compensation applied, seats released"
                    );
                    true
                }
                Err(e) => {
                    // Места уже свободны; запись повторится и снова ничего не изменит
                    error!(booking_code = %entry.booking_code, "Failed to resolve compensation: {:?}", e);
                    false
                }
            },
            Err(e) => {
                warn!(
                    booking_code = %entry.booking_code,
                    attempts = entry.attempts,
                    "Deferred compensation failed again: {}",
                    e
                );
                if let Err(record_err) = self
                    .outbox
                    .record(&entry.booking_code, &entry.seat_ids, &e.to_string())
                    .await
                {
                    error!(booking_code = %entry.booking_code, "Failed to update compensation: {:?}", record_err);
                }
                false
            }
        }
    }

    /// Фоновый цикл для `main`.
    pub async fn run(self, interval: Duration) {
        loop {
            self.run_once().await;
            tokio::time::sleep(interval).await;
        }
    }
}
