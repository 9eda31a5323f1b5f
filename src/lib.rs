pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;
pub mod ticket;

use std::sync::Arc;

use services::{auth::AuthVerifier, booking::BookingService, ticket_validator::TicketValidator};

// Shared state для всего приложения. Все хранилища внедряются снаружи,
// глобальных дескрипторов нет
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub ledger: Arc<dyn ledger::SeatLedger>,
    pub bookings: BookingService,
    pub validator: TicketValidator,
    pub auth: Arc<dyn AuthVerifier>,
    pub cache: Option<cache::CacheService>,
}

impl AppState {
    pub fn new(
        config: config::Config,
        ledger: Arc<dyn ledger::SeatLedger>,
        store: Arc<dyn store::BookingStore>,
        outbox: Arc<dyn store::CompensationOutbox>,
        auth: Arc<dyn AuthVerifier>,
        cache: Option<cache::CacheService>,
    ) -> Self {
        let step_timeout = config.saga.step_timeout();
        let mut bookings = BookingService::new(ledger.clone(), store.clone(), outbox, step_timeout);
        if let Some(cache) = &cache {
            bookings = bookings.with_cache(cache.clone());
        }
        let validator = TicketValidator::new(store, step_timeout);

        Self {
            config,
            ledger,
            bookings,
            validator,
            auth,
            cache,
        }
    }
}
