use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{ledger::LedgerError, store::StoreError, ticket::TicketError};

pub const INVALID_OR_USED: &str = "invalid or used ticket";

/// Ошибки сценариев бронирования и погашения билетов.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Некорректный запрос; отклоняется до любых побочных эффектов.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    /// Хотя бы одно место уже занято; ничего не изменено.
    #[error("some seats are not available")]
    InventoryUnavailable,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("failed to generate ticket: {0}")]
    TicketEncoding(String),
    #[error("failed to persist booking: {0}")]
    Persistence(String),
    /// Намеренно не различает "нет такого кода" и "уже погашен".
    #[error("invalid or used ticket")]
    InvalidOrUsedTicket,
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::InventoryUnavailable => StatusCode::CONFLICT,
            BookingError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::TicketEncoding(_) | BookingError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BookingError::InvalidOrUsedTicket => StatusCode::NOT_FOUND,
        }
    }

    // Детали из БД и сети остаются в логах
    fn public_message(&self) -> String {
        match self {
            BookingError::Validation(msg) => msg.clone(),
            BookingError::Unauthenticated => "Invalid token".to_string(),
            BookingError::InventoryUnavailable => "some seats are not available".to_string(),
            BookingError::UpstreamUnavailable(_) => "service temporarily unavailable".to_string(),
            BookingError::TicketEncoding(_) => "failed to generate ticket".to_string(),
            BookingError::Persistence(_) => "failed to create booking".to_string(),
            BookingError::InvalidOrUsedTicket => INVALID_OR_USED.to_string(),
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        BookingError::UpstreamUnavailable(err.to_string())
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Persistence(err.to_string())
    }
}

impl From<TicketError> for BookingError {
    fn from(err: TicketError) -> Self {
        BookingError::TicketEncoding(err.to_string())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            BookingError::InvalidOrUsedTicket => json!({ "valid": false, "error": INVALID_OR_USED }),
            ref other => json!({ "success": false, "error": other.public_message() }),
        };
        (status, Json(body)).into_response()
    }
}
