//! In-memory реализации реестра мест, хранилища броней и журнала компенсаций.
//!
//! Используются в тестах и локальных демо. Сериализация через `tokio::sync::Mutex`
//! работает только внутри одного процесса, поэтому в продакшене нужны
//! [`crate::ledger::PgSeatLedger`] и [`crate::store::PgBookingStore`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::ledger::{normalize_seat_ids, LedgerError, ReserveOutcome, SeatLedger};
use crate::models::{Booking, BookingStatus, NewBooking, PendingCompensation, Seat, Studio};
use crate::store::{BookingStore, CompensationOutbox, StoreError};

#[derive(Debug)]
struct SeatSlot {
    seat: Seat,
    holder: Option<String>,
}

#[derive(Debug, Default)]
struct SeatTable {
    seats: BTreeMap<i64, SeatSlot>,
    studios: BTreeMap<i64, Studio>,
}

#[derive(Debug, Default)]
pub struct InMemorySeatLedger {
    table: Mutex<SeatTable>,
}

impl InMemorySeatLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зал со свободными местами с указанными id.
    pub fn with_studio(studio_id: i64, seat_ids: impl IntoIterator<Item = i64>) -> Self {
        let mut table = SeatTable::default();
        for id in seat_ids {
            let seat = Seat {
                id,
                studio_id,
                seat_number: format!("S{}", id),
                is_available: true,
            };
            table.seats.insert(id, SeatSlot { seat, holder: None });
        }
        table.studios.insert(studio_id, studio(studio_id, table.seats.len()));
        Self { table: Mutex::new(table) }
    }

    pub async fn add_seat(&self, seat: Seat) {
        let mut table = self.table.lock().await;
        let studio_id = seat.studio_id;
        table.seats.insert(seat.id, SeatSlot { seat, holder: None });
        let total = table.seats.values().filter(|slot| slot.seat.studio_id == studio_id).count();
        table.studios.insert(studio_id, studio(studio_id, total));
    }

    pub async fn is_available(&self, seat_id: i64) -> Option<bool> {
        self.table
            .lock()
            .await
            .seats
            .get(&seat_id)
            .map(|slot| slot.seat.is_available)
    }

    pub async fn holder_of(&self, seat_id: i64) -> Option<String> {
        self.table
            .lock()
            .await
            .seats
            .get(&seat_id)
            .and_then(|slot| slot.holder.clone())
    }

    pub async fn available_ids(&self) -> Vec<i64> {
        self.table
            .lock()
            .await
            .seats
            .values()
            .filter(|slot| slot.seat.is_available)
            .map(|slot| slot.seat.id)
            .collect()
    }
}

fn studio(id: i64, total_seats: usize) -> Studio {
    Studio {
        id,
        name: format!("Studio {}", id),
        total_seats: total_seats as i32,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl SeatLedger for InMemorySeatLedger {
    async fn reserve(&self, seat_ids: &[i64], holder: &str) -> Result<ReserveOutcome, LedgerError> {
        let ids = normalize_seat_ids(seat_ids);
        let mut table = self.table.lock().await;

        let all_available = ids.iter().all(|id| {
            table
                .seats
                .get(id)
                .map(|slot| slot.seat.is_available)
                .unwrap_or(false)
        });
        if !all_available {
            return Ok(ReserveOutcome::Unavailable);
        }

        for id in &ids {
            if let Some(slot) = table.seats.get_mut(id) {
                slot.seat.is_available = false;
                slot.holder = Some(holder.to_string());
            }
        }
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError> {
        let mut table = self.table.lock().await;
        for id in seat_ids {
            if let Some(slot) = table.seats.get_mut(id) {
                if slot.holder.as_deref() == Some(holder) {
                    slot.seat.is_available = true;
                    slot.holder = None;
                }
            }
        }
        Ok(())
    }

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError> {
        Ok(self
            .table
            .lock()
            .await
            .seats
            .values()
            .filter(|slot| slot.seat.studio_id == studio_id)
            .map(|slot| slot.seat.clone())
            .collect())
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError> {
        Ok(self.table.lock().await.studios.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct BookingTable {
    rows: Vec<Booking>,
    // booking_code -> индекс в rows; аналог UNIQUE-индекса
    by_code: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    table: Mutex<BookingTable>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn find_by_code(&self, booking_code: &str) -> Option<Booking> {
        let table = self.table.lock().await;
        table.by_code.get(booking_code).map(|&idx| table.rows[idx].clone())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let mut table = self.table.lock().await;
        if table.by_code.contains_key(&booking.booking_code) {
            return Err(StoreError::DuplicateBookingCode(booking.booking_code));
        }

        let now = Utc::now();
        let row = Booking {
            id: table.rows.len() as i64 + 1,
            booking_code: booking.booking_code,
            requester_id: booking.requester_id,
            holder_name: booking.holder_name,
            holder_email: booking.holder_email,
            studio_id: booking.studio_id,
            seat_ids: booking.seat_ids,
            ticket_payload: booking.ticket_payload,
            channel: booking.channel,
            status: BookingStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let idx = table.rows.len();
        table.by_code.insert(row.booking_code.clone(), idx);
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn redeem(&self, booking_code: &str) -> Result<Option<Booking>, StoreError> {
        let mut table = self.table.lock().await;
        let Some(&idx) = table.by_code.get(booking_code) else {
            return Ok(None);
        };

        let row = &mut table.rows[idx];
        if row.status != BookingStatus::Active {
            return Ok(None);
        }
        row.status = BookingStatus::Used;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn list_for_requester(&self, requester_id: i64) -> Result<Vec<Booking>, StoreError> {
        let table = self.table.lock().await;
        let mut bookings: Vec<Booking> = table
            .rows
            .iter()
            .filter(|booking| booking.requester_id == Some(requester_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCompensationOutbox {
    entries: Mutex<BTreeMap<String, PendingCompensation>>,
}

impl InMemoryCompensationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, booking_code: &str) -> Option<PendingCompensation> {
        self.entries.lock().await.get(booking_code).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CompensationOutbox for InMemoryCompensationOutbox {
    async fn record(&self, booking_code: &str, seat_ids: &[i64], error: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        entries
            .entry(booking_code.to_string())
            .and_modify(|entry| {
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
                entry.updated_at = now;
            })
            .or_insert_with(|| PendingCompensation {
                booking_code: booking_code.to_string(),
                seat_ids: seat_ids.to_vec(),
                attempts: 1,
                last_error: Some(error.to_string()),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn pending(&self, limit: i64) -> Result<Vec<PendingCompensation>, StoreError> {
        let entries = self.entries.lock().await;
        let mut pending: Vec<PendingCompensation> = entries.values().cloned().collect();
        pending.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn resolve(&self, booking_code: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(booking_code);
        Ok(())
    }
}
