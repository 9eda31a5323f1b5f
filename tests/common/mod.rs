//! Общие тестовые двойники для интеграционных тестов.

#![allow(dead_code)]

use async_trait::async_trait;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cinema_booking::ledger::{LedgerError, ReserveOutcome, SeatLedger};
use cinema_booking::memory::{InMemoryBookingStore, InMemoryCompensationOutbox, InMemorySeatLedger};
use cinema_booking::models::{Booking, Identity, NewBooking, Seat, Studio};
use cinema_booking::services::booking::BookingService;
use cinema_booking::store::{BookingStore, StoreError};
use cinema_booking::ticket::{TicketError, TicketIssuer, TicketPayload, TicketRequest};

pub const STEP_TIMEOUT: Duration = Duration::from_millis(200);

pub fn identity(id: i64) -> Identity {
    Identity {
        id,
        email: SafeEmail().fake(),
        name: Name().fake(),
        role: "user".to_string(),
    }
}

pub fn walkin() -> (String, String) {
    (Name().fake(), SafeEmail().fake())
}

/// Зал 1 с местами 1..=10 и пустые хранилища.
pub struct Fixture {
    pub ledger: Arc<InMemorySeatLedger>,
    pub store: Arc<InMemoryBookingStore>,
    pub outbox: Arc<InMemoryCompensationOutbox>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(InMemorySeatLedger::with_studio(1, 1..=10)),
            store: Arc::new(InMemoryBookingStore::new()),
            outbox: Arc::new(InMemoryCompensationOutbox::new()),
        }
    }

    pub fn service(&self) -> BookingService {
        BookingService::new(
            self.ledger.clone(),
            self.store.clone(),
            self.outbox.clone(),
            STEP_TIMEOUT,
        )
    }

    pub fn service_with_store(&self, store: Arc<dyn BookingStore>) -> BookingService {
        BookingService::new(self.ledger.clone(), store, self.outbox.clone(), STEP_TIMEOUT)
    }

    pub async fn all_available(&self, seat_ids: &[i64]) -> bool {
        for id in seat_ids {
            if self.ledger.is_available(*id).await != Some(true) {
                return false;
            }
        }
        true
    }
}

/// Ждет, пока фоновая компенсация освободит места.
pub async fn wait_until_available(ledger: &InMemorySeatLedger, seat_ids: &[i64]) -> bool {
    for _ in 0..100 {
        let mut all = true;
        for id in seat_ids {
            if ledger.is_available(*id).await != Some(true) {
                all = false;
            }
        }
        if all {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Хранилище, у которого запись брони всегда падает.
pub struct FailingStore;

#[async_trait]
impl BookingStore for FailingStore {
    async fn insert(&self, _booking: NewBooking) -> Result<Booking, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn redeem(&self, _booking_code: &str) -> Result<Option<Booking>, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn list_for_requester(&self, _requester_id: i64) -> Result<Vec<Booking>, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

/// Хранилище, которое никогда не отвечает.
pub struct HangingStore;

#[async_trait]
impl BookingStore for HangingStore {
    async fn insert(&self, _booking: NewBooking) -> Result<Booking, StoreError> {
        std::future::pending().await
    }

    async fn redeem(&self, _booking_code: &str) -> Result<Option<Booking>, StoreError> {
        std::future::pending().await
    }

    async fn list_for_requester(&self, _requester_id: i64) -> Result<Vec<Booking>, StoreError> {
        std::future::pending().await
    }
}

pub struct FailingIssuer;

impl TicketIssuer for FailingIssuer {
    fn issue(&self, _request: &TicketRequest<'_>) -> Result<TicketPayload, TicketError> {
        Err(TicketError::Malformed("encoder exploded".to_string()))
    }
}

/// Реестр, у которого release можно "сломать" на время теста.
pub struct FlakyLedger {
    pub inner: InMemorySeatLedger,
    pub fail_release: AtomicBool,
    /// Release применяется к реестру, но ответ "теряется".
    pub lose_release_reply: AtomicBool,
    pub release_calls: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: InMemorySeatLedger) -> Self {
        Self {
            inner,
            fail_release: AtomicBool::new(true),
            lose_release_reply: AtomicBool::new(false),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Release доходит до реестра, но вызывающий получает ошибку.
    pub fn losing_replies(inner: InMemorySeatLedger) -> Self {
        let ledger = Self::new(inner);
        ledger.lose_release_reply.store(true, Ordering::SeqCst);
        ledger
    }

    pub fn heal(&self) {
        self.fail_release.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SeatLedger for FlakyLedger {
    async fn reserve(&self, seat_ids: &[i64], holder: &str) -> Result<ReserveOutcome, LedgerError> {
        self.inner.reserve(seat_ids, holder).await
    }

    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fail_release.load(Ordering::SeqCst) {
            return self.inner.release(seat_ids, holder).await;
        }
        if self.lose_release_reply.load(Ordering::SeqCst) {
            self.inner.release(seat_ids, holder).await?;
            return Err(LedgerError::Upstream("response lost".to_string()));
        }
        Err(LedgerError::Upstream("connection reset".to_string()))
    }

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError> {
        self.inner.list_seats(studio_id).await
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError> {
        self.inner.list_studios().await
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReserveFault {
    Error,
    Hang,
}

/// Реестр, у которого reserve падает или зависает; остальное идет во внутренний.
pub struct BrokenReserveLedger {
    pub inner: InMemorySeatLedger,
    pub fault: ReserveFault,
    pub release_calls: AtomicUsize,
}

impl BrokenReserveLedger {
    pub fn new(inner: InMemorySeatLedger, fault: ReserveFault) -> Self {
        Self {
            inner,
            fault,
            release_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SeatLedger for BrokenReserveLedger {
    async fn reserve(&self, _seat_ids: &[i64], _holder: &str) -> Result<ReserveOutcome, LedgerError> {
        match self.fault {
            ReserveFault::Error => Err(LedgerError::Upstream("503 Service Unavailable".to_string())),
            ReserveFault::Hang => std::future::pending().await,
        }
    }

    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release(seat_ids, holder).await
    }

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError> {
        self.inner.list_seats(studio_id).await
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError> {
        self.inner.list_studios().await
    }
}
