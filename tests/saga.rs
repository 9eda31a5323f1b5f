//! Сага бронирования поверх in-memory хранилищ.
//!
//! Run with: `cargo test --test saga`

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cinema_booking::error::BookingError;
use cinema_booking::ledger::{ReserveOutcome, SeatLedger};
use cinema_booking::memory::{InMemoryCompensationOutbox, InMemorySeatLedger};
use cinema_booking::models::{BookingChannel, BookingStatus};
use cinema_booking::services::booking::BookingService;
use cinema_booking::services::reconciler::CompensationReconciler;
use cinema_booking::store::CompensationOutbox;
use common::{
    identity, walkin, BrokenReserveLedger, FailingIssuer, FailingStore, Fixture, FlakyLedger, HangingStore, ReserveFault,
    STEP_TIMEOUT,
};

#[tokio::test]
async fn online_booking_reserves_seats_and_persists_active_booking() {
    let fx = Fixture::new();
    let user = identity(42);

    let created = fx
        .service()
        .create_online_booking(1, &[1, 2, 3], &user)
        .await
        .unwrap();

    assert_eq!(created.booking.status, BookingStatus::Active);
    assert_eq!(created.booking.channel, BookingChannel::Online);
    assert_eq!(created.booking.requester_id, Some(42));
    assert_eq!(created.booking.seat_ids, vec![1, 2, 3]);
    assert_eq!(created.booking.ticket_payload, created.ticket.as_str());
    for id in [1, 2, 3] {
        assert_eq!(fx.ledger.is_available(id).await, Some(false));
    }

    let claims = created.ticket.claims().unwrap();
    assert_eq!(claims.booking_code, created.booking.booking_code);
    assert_eq!(claims.user_id, Some(42));
    assert_eq!(claims.customer_name, None);
}

#[tokio::test]
async fn repeated_booking_of_same_seats_is_rejected_without_side_effects() {
    let fx = Fixture::new();
    let service = fx.service();
    let user = identity(42);

    service.create_online_booking(1, &[1, 2, 3], &user).await.unwrap();
    let err = service
        .create_online_booking(1, &[1, 2, 3], &user)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::InventoryUnavailable));
    assert_eq!(fx.store.count().await, 1);
    assert!(fx.outbox.is_empty().await);
}

#[tokio::test]
async fn partially_taken_batch_leaves_free_seats_untouched() {
    let fx = Fixture::new();
    let service = fx.service();

    service.create_online_booking(1, &[2], &identity(1)).await.unwrap();
    let err = service
        .create_online_booking(1, &[1, 2, 3], &identity(2))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::InventoryUnavailable));
    assert!(fx.all_available(&[1, 3]).await);
}

#[tokio::test]
async fn failed_persistence_releases_reserved_seats() {
    let fx = Fixture::new();
    let service = fx.service_with_store(Arc::new(FailingStore));

    let err = service
        .create_online_booking(1, &[4, 5], &identity(7))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Persistence(_)));
    assert_eq!(fx.ledger.reserve(&[4, 5], "walk-in").await.unwrap(), ReserveOutcome::Reserved);
    assert!(fx.outbox.is_empty().await);
}

#[tokio::test]
async fn persistence_timeout_releases_reserved_seats() {
    let fx = Fixture::new();
    let service = fx.service_with_store(Arc::new(HangingStore));

    let err = service
        .create_online_booking(1, &[6], &identity(7))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Persistence(_)));
    assert!(fx.all_available(&[6]).await);
}

#[tokio::test]
async fn offline_booking_without_holder_name_changes_nothing() {
    let fx = Fixture::new();
    let service = fx.service();
    service.create_online_booking(1, &[1], &identity(1)).await.unwrap();
    let before = fx.ledger.available_ids().await;

    let (_, email) = walkin();
    let err = service
        .create_offline_booking(1, &[2, 3], "   ", &email)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Validation(_)));
    assert_eq!(fx.ledger.available_ids().await, before);
    assert_eq!(fx.store.count().await, 1);
}

#[tokio::test]
async fn invalid_selection_is_rejected_before_reservation() {
    let fx = Fixture::new();
    let service = fx.service();
    let user = identity(1);

    for (studio_id, seats) in [(0, vec![1]), (1, vec![]), (1, vec![-3])] {
        let err = service
            .create_online_booking(studio_id, &seats, &user)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)), "studio {studio_id} seats {seats:?}");
    }

    assert_eq!(fx.ledger.available_ids().await.len(), 10);
}

#[tokio::test]
async fn offline_booking_carries_customer_name_in_ticket() {
    let fx = Fixture::new();
    let (name, email) = walkin();

    let created = fx
        .service()
        .create_offline_booking(1, &[8, 9], &name, &email)
        .await
        .unwrap();

    assert_eq!(created.booking.channel, BookingChannel::Offline);
    assert_eq!(created.booking.requester_id, None);
    assert_eq!(created.booking.holder_name, name);

    let claims = created.ticket.claims().unwrap();
    assert_eq!(claims.user_id, None);
    assert_eq!(claims.customer_name.as_deref(), Some(name.as_str()));
}

#[tokio::test]
async fn offline_booking_rejects_malformed_email() {
    let fx = Fixture::new();
    let (name, _) = walkin();

    let err = fx
        .service()
        .create_offline_booking(1, &[1], &name, "not-an-email")
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Validation(_)));
    assert!(fx.all_available(&[1]).await);
}

#[tokio::test]
async fn ticket_encoding_failure_is_compensated() {
    let fx = Fixture::new();
    let service = fx.service().with_issuer(Arc::new(FailingIssuer));

    let err = service
        .create_online_booking(1, &[1, 2], &identity(3))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::TicketEncoding(_)));
    assert!(fx.all_available(&[1, 2]).await);
    assert_eq!(fx.store.count().await, 0);
}

#[tokio::test]
async fn duplicate_seat_ids_are_reserved_once() {
    let fx = Fixture::new();

    let created = fx
        .service()
        .create_online_booking(1, &[3, 1, 3, 1], &identity(3))
        .await
        .unwrap();

    // Порядок покупателя сохраняется, повторы отбрасываются
    assert_eq!(created.booking.seat_ids, vec![3, 1]);
    assert_eq!(created.ticket.claims().unwrap().seat_ids, vec![3, 1]);
    assert_eq!(fx.ledger.holder_of(3).await, Some(created.booking.booking_code.clone()));
    assert_eq!(fx.ledger.holder_of(1).await, Some(created.booking.booking_code));
}

#[tokio::test]
async fn seats_of_another_studio_are_rejected_without_side_effects() {
    let fx = Fixture::new();
    fx.ledger
        .add_seat(cinema_booking::models::Seat {
            id: 11,
            studio_id: 2,
            seat_number: "A1".to_string(),
            is_available: true,
        })
        .await;

    let err = fx
        .service()
        .create_online_booking(1, &[1, 11], &identity(3))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    let err = fx
        .service()
        .create_online_booking(1, &[2, 99], &identity(3))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    assert_eq!(fx.ledger.available_ids().await.len(), 11);
    assert_eq!(fx.store.count().await, 0);
}

#[tokio::test]
async fn reserve_failure_is_upstream_unavailable_without_compensation() {
    for fault in [ReserveFault::Error, ReserveFault::Hang] {
        let ledger = Arc::new(BrokenReserveLedger::new(InMemorySeatLedger::with_studio(1, 1..=5), fault));
        let fx = Fixture::new();
        let service = BookingService::new(ledger.clone(), fx.store.clone(), fx.outbox.clone(), STEP_TIMEOUT);

        let err = service
            .create_online_booking(1, &[1, 2], &identity(4))
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::UpstreamUnavailable(_)), "{fault:?}: {err:?}");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ledger.release_calls.load(Ordering::SeqCst), 0, "{fault:?}");
        assert!(fx.outbox.is_empty().await, "{fault:?}");
        assert_eq!(fx.store.count().await, 0, "{fault:?}");
    }
}

#[tokio::test]
async fn booking_codes_are_unique_across_bookings() {
    let fx = Fixture::new();
    let service = fx.service();

    let mut codes = HashSet::new();
    for seat in 1..=10 {
        let created = service
            .create_online_booking(1, &[seat], &identity(seat))
            .await
            .unwrap();
        codes.insert(created.booking.booking_code);
    }

    assert_eq!(codes.len(), 10);
}

#[tokio::test]
async fn bookings_are_listed_for_their_requester_only() {
    let fx = Fixture::new();
    let service = fx.service();
    let alice = identity(1);
    let bob = identity(2);

    service.create_online_booking(1, &[1], &alice).await.unwrap();
    service.create_online_booking(1, &[2], &bob).await.unwrap();
    service.create_online_booking(1, &[3], &alice).await.unwrap();
    let (name, email) = walkin();
    service.create_offline_booking(1, &[4], &name, &email).await.unwrap();

    let bookings = service.list_bookings_for_requester(alice.id).await.unwrap();
    assert_eq!(bookings.len(), 2);
    assert!(bookings.iter().all(|b| b.requester_id == Some(alice.id)));
}

#[tokio::test]
async fn failed_compensation_is_recorded_and_reconciled_later() {
    let flaky = Arc::new(FlakyLedger::new(InMemorySeatLedger::with_studio(1, 1..=5)));
    let outbox = Arc::new(InMemoryCompensationOutbox::new());
    let service = BookingService::new(flaky.clone(), Arc::new(FailingStore), outbox.clone(), STEP_TIMEOUT);

    let err = service
        .create_online_booking(1, &[4, 5], &identity(9))
        .await
        .unwrap_err();

    // Исходная ошибка не подменяется ошибкой компенсации
    assert!(matches!(err, BookingError::Persistence(_)));
    assert_eq!(flaky.inner.is_available(4).await, Some(false));

    let pending = outbox.pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].seat_ids, vec![4, 5]);
    assert_eq!(pending[0].attempts, 1);

    let reconciler = CompensationReconciler::new(flaky.clone(), outbox.clone(), 10);

    let stats = reconciler.run_once().await;
    assert_eq!((stats.attempted, stats.resolved, stats.failed), (1, 0, 1));
    assert_eq!(outbox.get(&pending[0].booking_code).await.unwrap().attempts, 2);

    flaky.heal();
    let stats = reconciler.run_once().await;
    assert_eq!((stats.attempted, stats.resolved, stats.failed), (1, 1, 0));
    assert!(outbox.is_empty().await);
    assert_eq!(flaky.inner.is_available(4).await, Some(true));
    assert_eq!(flaky.inner.is_available(5).await, Some(true));
}

#[tokio::test]
async fn late_compensation_retry_never_frees_seats_resold_to_another_booking() {
    let flaky = Arc::new(FlakyLedger::losing_replies(InMemorySeatLedger::with_studio(1, 1..=5)));
    let outbox = Arc::new(InMemoryCompensationOutbox::new());
    let fx = Fixture::new();

    // Release применился, но ответ потерян: запись уходит в журнал
    let failing = BookingService::new(flaky.clone(), Arc::new(FailingStore), outbox.clone(), STEP_TIMEOUT);
    let err = failing
        .create_online_booking(1, &[4, 5], &identity(1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Persistence(_)));
    assert_eq!(outbox.len().await, 1);
    assert_eq!(flaky.inner.is_available(4).await, Some(true));

    // Места перепроданы другому покупателю
    let service = BookingService::new(flaky.clone(), fx.store.clone(), outbox.clone(), STEP_TIMEOUT);
    let alice = service.create_online_booking(1, &[4, 5], &identity(2)).await.unwrap();

    let reconciler = CompensationReconciler::new(flaky.clone(), outbox.clone(), 10);
    reconciler.run_once().await;
    flaky.heal();
    let stats = reconciler.run_once().await;
    assert_eq!(stats.resolved, 1);
    assert!(outbox.is_empty().await);

    for id in [4, 5] {
        assert_eq!(flaky.inner.holder_of(id).await, Some(alice.booking.booking_code.clone()));
    }
    let err = service
        .create_online_booking(1, &[4, 5], &identity(3))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InventoryUnavailable));
}

#[tokio::test]
async fn repeatedly_failing_entry_does_not_starve_newer_ones() {
    let outbox = InMemoryCompensationOutbox::new();

    outbox.record("first", &[1], "connection reset").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    outbox.record("second", &[2], "connection reset").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    // Повторная неудача отодвигает запись в конец очереди
    outbox.record("first", &[1], "connection reset").await.unwrap();

    let pending = outbox.pending(1).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].booking_code, "second");
}

#[tokio::test]
async fn reconciler_with_empty_outbox_does_nothing() {
    let fx = Fixture::new();
    let reconciler = CompensationReconciler::new(fx.ledger.clone(), fx.outbox.clone(), 10);

    let stats = reconciler.run_once().await;

    assert_eq!(stats.attempted, 0);
    assert_eq!(fx.ledger.available_ids().await.len(), 10);
}

#[tokio::test]
async fn cancelled_saga_releases_seats_in_background() {
    let fx = Fixture::new();
    // Шаги сами не истекают: сагу отменяет только внешний таймаут
    let service = BookingService::new(
        fx.ledger.clone(),
        Arc::new(HangingStore),
        fx.outbox.clone(),
        Duration::from_secs(30),
    );

    let user = identity(5);
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        service.create_online_booking(1, &[7, 8], &user),
    )
    .await;

    assert!(outcome.is_err());
    assert!(common::wait_until_available(&fx.ledger, &[7, 8]).await);
    assert!(fx.outbox.is_empty().await);
}

#[tokio::test]
async fn successful_saga_never_calls_release() {
    let flaky = Arc::new(FlakyLedger::new(InMemorySeatLedger::with_studio(1, 1..=3)));
    let fx = Fixture::new();
    let service = BookingService::new(flaky.clone(), fx.store.clone(), fx.outbox.clone(), STEP_TIMEOUT);

    service.create_online_booking(1, &[1, 2], &identity(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(flaky.release_calls.load(Ordering::SeqCst), 0);
    assert!(fx.outbox.is_empty().await);
}
