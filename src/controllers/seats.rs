use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::BookingError;
use crate::ledger::ReserveOutcome;
use crate::AppState;

/// HTTP-фасад реестра мест: тот же контракт, которым пользуется `HttpSeatLedger`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cinema/seats/reserve", post(reserve_seats))
        .route("/cinema/seats/release", post(release_seats))
        .route("/cinema/studios", get(get_studios))
        .route("/cinema/studios/{studio_id}/seats", get(get_studio_seats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeatBatchRequest {
    #[serde(default)]
    seat_ids: Vec<i64>,
    /// Владелец резерва; release снимает только его места.
    #[serde(default)]
    holder: String,
}

fn parse_batch(payload: Result<Json<SeatBatchRequest>, JsonRejection>) -> Result<SeatBatchRequest, BookingError> {
    let Json(req) = payload.map_err(|_| BookingError::Validation("Invalid request".to_string()))?;
    if req.seat_ids.is_empty() {
        return Err(BookingError::Validation("seatIds must not be empty".to_string()));
    }
    if req.holder.trim().is_empty() {
        return Err(BookingError::Validation("holder must not be empty".to_string()));
    }
    Ok(req)
}

// POST /api/cinema/seats/reserve
async fn reserve_seats(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SeatBatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let req = parse_batch(payload)?;

    match state.ledger.reserve(&req.seat_ids, &req.holder).await? {
        ReserveOutcome::Reserved => {
            if let Some(cache) = &state.cache {
                cache.invalidate_all_seats().await;
            }
            Ok((StatusCode::OK, Json(json!({ "message": "Seats reserved successfully" }))))
        }
        ReserveOutcome::Unavailable => Err(BookingError::InventoryUnavailable),
    }
}

// POST /api/cinema/seats/release
async fn release_seats(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SeatBatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let req = parse_batch(payload)?;

    state.ledger.release(&req.seat_ids, &req.holder).await?;
    if let Some(cache) = &state.cache {
        cache.invalidate_all_seats().await;
    }

    Ok((StatusCode::OK, Json(json!({ "message": "Seats released successfully" }))))
}

// GET /api/cinema/studios
async fn get_studios(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    let studios = state.ledger.list_studios().await.map_err(|e| {
        tracing::error!("get_studios failed: {:?}", e);
        BookingError::from(e)
    })?;

    Ok((StatusCode::OK, Json(studios)))
}

// GET /api/cinema/studios/{studio_id}/seats
async fn get_studio_seats(
    State(state): State<Arc<AppState>>,
    Path(studio_id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    if studio_id <= 0 {
        return Err(BookingError::Validation("studio_id must be greater than 0".to_string()));
    }

    if let Some(cache) = &state.cache {
        if let Some(seats) = cache.get_cached_seats(studio_id).await {
            return Ok((StatusCode::OK, [("x-cache", "HIT")], Json(seats)));
        }
    }

    let seats = state.ledger.list_seats(studio_id).await.map_err(|e| {
        tracing::error!("get_studio_seats failed for studio {}: {:?}", studio_id, e);
        BookingError::from(e)
    })?;

    if let Some(cache) = &state.cache {
        cache.cache_seats(studio_id, &seats).await;
    }

    Ok((StatusCode::OK, [("x-cache", "MISS")], Json(seats)))
}
