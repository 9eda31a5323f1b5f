use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::Booking;
use crate::services::booking::CreatedBooking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/booking/online", post(create_online_booking))
        .route("/booking/offline", post(create_offline_booking))
        .route("/booking/validate", post(validate_ticket))
        .route("/booking/my-bookings", get(get_user_bookings))
}

/* ---------- helpers ---------- */

fn invalid_body(rejection: JsonRejection) -> BookingError {
    tracing::debug!("rejected request body: {}", rejection.body_text());
    BookingError::Validation("Invalid request".to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingCreatedResponse {
    booking: Booking,
    qr_code: String,
}

async fn booking_created(state: &AppState, created: CreatedBooking) -> impl IntoResponse {
    if let Some(cache) = &state.cache {
        cache.invalidate_seats(created.booking.studio_id).await;
    }

    (
        StatusCode::CREATED,
        Json(BookingCreatedResponse {
            booking: created.booking,
            qr_code: created.ticket.into_string(),
        }),
    )
}

/* ---------- BOOKINGS ---------- */

// POST /api/booking/online
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnlineBookingRequest {
    studio_id: i64,
    seat_ids: Vec<i64>,
}

async fn create_online_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<OnlineBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Json(req) = payload.map_err(invalid_body)?;

    let created = state
        .bookings
        .create_online_booking(req.studio_id, &req.seat_ids, &identity)
        .await?;

    Ok(booking_created(&state, created).await)
}

// POST /api/booking/offline
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfflineBookingRequest {
    studio_id: i64,
    seat_ids: Vec<i64>,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    customer_email: String,
}

async fn create_offline_booking(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OfflineBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Json(req) = payload.map_err(invalid_body)?;

    let created = state
        .bookings
        .create_offline_booking(req.studio_id, &req.seat_ids, &req.customer_name, &req.customer_email)
        .await?;

    Ok(booking_created(&state, created).await)
}

// POST /api/booking/validate
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateTicketRequest {
    #[serde(default)]
    booking_code: String,
}

async fn validate_ticket(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateTicketRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Json(req) = payload.map_err(invalid_body)?;

    let summary = state.validator.redeem(&req.booking_code).await?;

    Ok((StatusCode::OK, Json(json!({ "valid": true, "booking": summary }))))
}

// GET /api/booking/my-bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    let bookings = state.bookings.list_bookings_for_requester(identity.id).await?;
    Ok((StatusCode::OK, Json(bookings)))
}
