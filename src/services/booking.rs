//! booking.rs
//!
//! Сага бронирования: резерв мест -> выпуск билета -> запись брони.
//! Любой сбой после успешного резерва компенсируется освобождением мест.
//!
//! Компенсация выполняется по принципу best-effort:
//! 1.  Явный сбой шага - места освобождаются сразу, вызывающий получает исходную ошибку.
//! 2.  Если освобождение не удалось, оно записывается в журнал компенсаций
//!     (`CompensationOutbox`) по коду брони и повторяется фоновым `CompensationReconciler`.
//! 3.  Если future саги сброшен после резерва (клиент отключился, отмена),
//!     `ReservationGuard` запускает ту же компенсацию в отдельной задаче.
//!
//! Места закрепляются за кодом брони, поэтому и немедленная, и отложенная
//! компенсация освобождают только места этой брони.
//!
//! Шаги саги не повторяются автоматически.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use validator::Validate;

use crate::cache::CacheService;
use crate::error::BookingError;
use crate::ledger::{dedup_seat_ids, ReserveOutcome, SeatLedger};
use crate::models::{Booking, BookingChannel, Identity, NewBooking};
use crate::store::{BookingStore, CompensationOutbox};
use crate::ticket::{
    generate_booking_code, QrTicketIssuer, TicketHolder, TicketIssuer, TicketPayload, TicketRequest,
};

#[derive(Debug, Clone, Validate)]
struct SeatSelection {
    #[validate(range(min = 1, message = "studioId must be greater than 0"))]
    studio_id: i64,
    #[validate(length(min = 1, message = "seatIds must not be empty"))]
    seat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Validate)]
struct WalkinHolder {
    #[validate(length(min = 1, max = 255, message = "customerName is required"))]
    name: String,
    #[validate(email(message = "customerEmail must be a valid email"))]
    email: String,
}

impl SeatSelection {
    fn parse(studio_id: i64, seat_ids: &[i64]) -> Result<Self, BookingError> {
        let selection = SeatSelection {
            studio_id,
            seat_ids: dedup_seat_ids(seat_ids),
        };
        selection
            .validate()
            .map_err(|e| BookingError::Validation(e.to_string()))?;

        if selection.seat_ids.iter().any(|id| *id <= 0) {
            return Err(BookingError::Validation("seatIds must be greater than 0".to_string()));
        }
        Ok(selection)
    }
}

/// Все, что сага пишет в бронь помимо мест и зала.
#[derive(Debug, Clone)]
struct HolderDetails {
    requester_id: Option<i64>,
    name: String,
    email: String,
    ticket_holder: TicketHolder,
    channel: BookingChannel,
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub ticket: TicketPayload,
}

#[derive(Clone)]
pub struct BookingService {
    ledger: Arc<dyn SeatLedger>,
    store: Arc<dyn BookingStore>,
    outbox: Arc<dyn CompensationOutbox>,
    issuer: Arc<dyn TicketIssuer>,
    cache: Option<CacheService>,
    step_timeout: Duration,
}

impl BookingService {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        store: Arc<dyn BookingStore>,
        outbox: Arc<dyn CompensationOutbox>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            outbox,
            issuer: Arc::new(QrTicketIssuer),
            cache: None,
            step_timeout,
        }
    }

    pub fn with_issuer(mut self, issuer: Arc<dyn TicketIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Компенсация будет сбрасывать кеш схемы зала.
    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Бронь покупателя, уже подтвержденного сервисом авторизации.
    pub async fn create_online_booking(
        &self,
        studio_id: i64,
        seat_ids: &[i64],
        identity: &Identity,
    ) -> Result<CreatedBooking, BookingError> {
        let selection = SeatSelection::parse(studio_id, seat_ids)?;
        if identity.id <= 0 {
            return Err(BookingError::Unauthenticated);
        }

        let holder = HolderDetails {
            requester_id: Some(identity.id),
            name: identity.name.clone(),
            email: identity.email.clone(),
            ticket_holder: TicketHolder::Requester(identity.id),
            channel: BookingChannel::Online,
        };
        self.run_saga(selection, holder).await
    }

    /// Бронь из кассы: покупатель не аутентифицирован, имя и email вводит кассир.
    pub async fn create_offline_booking(
        &self,
        studio_id: i64,
        seat_ids: &[i64],
        holder_name: &str,
        holder_email: &str,
    ) -> Result<CreatedBooking, BookingError> {
        let selection = SeatSelection::parse(studio_id, seat_ids)?;
        let walkin = WalkinHolder {
            name: holder_name.trim().to_string(),
            email: holder_email.trim().to_string(),
        };
        walkin
            .validate()
            .map_err(|e| BookingError::Validation(e.to_string()))?;

        let holder = HolderDetails {
            requester_id: None,
            ticket_holder: TicketHolder::Walkin(walkin.name.clone()),
            name: walkin.name,
            email: walkin.email,
            channel: BookingChannel::Offline,
        };
        self.run_saga(selection, holder).await
    }

    pub async fn list_bookings_for_requester(&self, requester_id: i64) -> Result<Vec<Booking>, BookingError> {
        match timeout(self.step_timeout, self.store.list_for_requester(requester_id)).await {
            Ok(result) => result.map_err(|e| {
                error!(requester_id, "Failed to fetch bookings: {:?}", e);
                BookingError::from(e)
            }),
            Err(_) => Err(BookingError::Persistence("listing bookings timed out".to_string())),
        }
    }

    /// Все места брони принадлежат залу `studio_id`.
    async fn ensure_seats_in_studio(&self, studio_id: i64, seat_ids: &[i64]) -> Result<(), BookingError> {
        let seats = match timeout(self.step_timeout, self.ledger.list_seats(studio_id)).await {
            Ok(Ok(seats)) => seats,
            Ok(Err(e)) => {
                error!(studio_id, "Failed to load studio seats: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                return Err(BookingError::UpstreamUnavailable("loading studio seats timed out".to_string()));
            }
        };

        let known: HashSet<i64> = seats.iter().map(|seat| seat.id).collect();
        let foreign: Vec<i64> = seat_ids.iter().copied().filter(|id| !known.contains(id)).collect();
        if !foreign.is_empty() {
            info!(studio_id, seat_ids = ?foreign, "Booking rejected: seats outside studio");
            return Err(BookingError::Validation(format!(
                "seats {:?} do not belong to studio {}",
                foreign, studio_id
            )));
        }
        Ok(())
    }

    async fn run_saga(&self, selection: SeatSelection, holder: HolderDetails) -> Result<CreatedBooking, BookingError> {
        let SeatSelection { studio_id, seat_ids } = selection;
        self.ensure_seats_in_studio(studio_id, &seat_ids).await?;

        // Код нужен уже при резерве: им помечаются места
        let booking_code = generate_booking_code();

        // Шаг 2: резерв. До него компенсировать нечего
        match timeout(self.step_timeout, self.ledger.reserve(&seat_ids, &booking_code)).await {
            Ok(Ok(ReserveOutcome::Reserved)) => {}
            Ok(Ok(ReserveOutcome::Unavailable)) => {
                info!(studio_id, seat_ids = ?seat_ids, "Booking rejected: seats unavailable");
                return Err(BookingError::InventoryUnavailable);
            }
            Ok(Err(e)) => {
                error!(studio_id, seat_ids = ?seat_ids, "Seat reservation failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                // Резерв мог еще не дойти до реестра и примениться уже после release; не компенсируем
                warn!(studio_id, seat_ids = ?seat_ids, "Seat reservation timed out");
                return Err(BookingError::UpstreamUnavailable("seat reservation timed out".to_string()));
            }
        }

        let mut guard = ReservationGuard::arm(Compensation {
            ledger: self.ledger.clone(),
            outbox: self.outbox.clone(),
            cache: self.cache.clone(),
            booking_code: booking_code.clone(),
            studio_id,
            seat_ids: seat_ids.clone(),
            step_timeout: self.step_timeout,
        });

        // Шаг 3: билет
        let ticket = match self.issuer.issue(&TicketRequest {
            booking_code: &booking_code,
            studio_id,
            seat_ids: &seat_ids,
            holder: &holder.ticket_holder,
        }) {
            Ok(ticket) => ticket,
            Err(e) => {
                let err = BookingError::from(e);
                guard.compensate(&err).await;
                return Err(err);
            }
        };

        // Шаг 4: запись брони
        let new_booking = NewBooking {
            booking_code: booking_code.clone(),
            requester_id: holder.requester_id,
            holder_name: holder.name,
            holder_email: holder.email,
            studio_id,
            seat_ids,
            ticket_payload: ticket.as_str().to_string(),
            channel: holder.channel,
        };

        let booking = match timeout(self.step_timeout, self.store.insert(new_booking)).await {
            Ok(Ok(booking)) => booking,
            Ok(Err(e)) => {
                error!(booking_code = %booking_code, "Failed to persist booking: {}", e);
                let err = BookingError::from(e);
                guard.compensate(&err).await;
                return Err(err);
            }
            Err(_) => {
                let err = BookingError::Persistence("booking insert timed out".to_string());
                guard.compensate(&err).await;
                return Err(err);
            }
        };

        guard.disarm();
        info!(
            booking_code = %booking.booking_code,
            studio_id,
            seat_ids = ?booking.seat_ids,
            channel = booking.channel.as_str(),
            "Booking created"
        );

        Ok(CreatedBooking { booking, ticket })
    }
}

/// Освобождение мест для одной саги.
#[derive(Clone)]
struct Compensation {
    ledger: Arc<dyn SeatLedger>,
    outbox: Arc<dyn CompensationOutbox>,
    cache: Option<CacheService>,
    booking_code: String,
    studio_id: i64,
    seat_ids: Vec<i64>,
    step_timeout: Duration,
}

impl Compensation {
    async fn run(self, reason: String) {
        let release = self.ledger.release(&self.seat_ids, &self.booking_code);
        let failure = match timeout(self.step_timeout, release).await {
            Ok(Ok(())) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate_seats(self.studio_id).await;
                }
                info!(
                    booking_code = %self.booking_code,
                    seat_ids = ?self.seat_ids,
                    reason = %reason,
                    "Compensation succeeded: seats released"
                );
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "seat release timed out".to_string(),
        };

        error!(
            booking_code = %self.booking_code,
            seat_ids = ?self.seat_ids,
            reason = %reason,
            "Compensation failed: {}; deferring to reconciler",
            failure
        );

        let recorded = timeout(
            self.step_timeout,
            self.outbox.record(&self.booking_code, &self.seat_ids, &failure),
        )
        .await;

        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                booking_code = %self.booking_code,
                seat_ids = ?self.seat_ids,
                "Failed to record pending compensation, seats stay reserved: {}",
                e
            ),
            Err(_) => error!(
                booking_code = %self.booking_code,
                seat_ids = ?self.seat_ids,
                "Recording pending compensation timed out, seats stay reserved"
            ),
        }
    }
}

/// Держит компенсацию, пока сага не завершилась успешно. При сбросе
/// во взведенном состоянии освобождает места в отдельной задаче.
struct ReservationGuard {
    compensation: Option<Compensation>,
}

impl ReservationGuard {
    fn arm(compensation: Compensation) -> Self {
        Self { compensation: Some(compensation) }
    }

    async fn compensate(&mut self, reason: &BookingError) {
        // Остается взведенным до конца: если отменят посреди release,
        // Drop повторит его, а release идемпотентен
        if let Some(compensation) = self.compensation.clone() {
            compensation.run(reason.to_string()).await;
            self.compensation = None;
        }
    }

    fn disarm(&mut self) {
        self.compensation = None;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        let Some(compensation) = self.compensation.take() else {
            return;
        };

        warn!(
            booking_code = %compensation.booking_code,
            seat_ids = ?compensation.seat_ids,
            "Booking saga cancelled after reservation, compensating"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(compensation.run("saga cancelled".to_string()));
            }
            Err(_) => error!(
                booking_code = %compensation.booking_code,
                seat_ids = ?compensation.seat_ids,
                "No runtime to compensate cancelled saga, seats stay reserved"
            ),
        }
    }
}
