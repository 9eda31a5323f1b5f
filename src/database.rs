use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::ledger::PgSeatLedger;
use crate::store::{PgBookingStore, PgCompensationOutbox};

/// Пул PostgreSQL и фабрика репозиториев поверх него.
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    pub fn seat_ledger(&self) -> PgSeatLedger {
        PgSeatLedger::new(self.pool.clone())
    }

    pub fn booking_store(&self) -> PgBookingStore {
        PgBookingStore::new(self.pool.clone())
    }

    pub fn compensation_outbox(&self) -> PgCompensationOutbox {
        PgCompensationOutbox::new(self.pool.clone())
    }
}
