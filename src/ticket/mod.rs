//! Выпуск билетов.
//!
//! Билет - это QR-код в PNG, отданный как data URI:
//! `data:image/png;base64,<png>`. Внутри кода JSON с утверждениями о брони.
//! Метка времени с наносекундами делает два билета с одинаковыми входными
//! данными разными. Это свойство неповторяемости, а не защита: подлинность
//! билета проверяется только по коду брони в хранилище.

use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;
use uuid::Uuid;

pub const PAYLOAD_PREFIX: &str = "data:image/png;base64,";

// Минимальная сторона картинки, px; сканеры на телефонах читают уверенно
const QR_MIN_SIZE: u32 = 256;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("failed to encode ticket claims: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to render QR code: {0}")]
    Render(String),
    #[error("malformed ticket payload: {0}")]
    Malformed(String),
}

/// Случайный код брони (UUID v4, 122 случайных бита). Уникальность
/// обеспечивает ограничение хранилища, а не генератор.
pub fn generate_booking_code() -> String {
    Uuid::new_v4().to_string()
}

/// Владелец билета: ровно одно из двух.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketHolder {
    /// Онлайн-покупатель, подтвержденный сервисом авторизации.
    Requester(i64),
    /// Покупатель в кассе, имя записано кассиром.
    Walkin(String),
}

#[derive(Debug, Clone)]
pub struct TicketRequest<'a> {
    pub booking_code: &'a str,
    pub studio_id: i64,
    pub seat_ids: &'a [i64],
    pub holder: &'a TicketHolder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TicketClaims {
    pub booking_code: String,
    pub studio_id: i64,
    pub seat_ids: Vec<i64>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

/// Закодированный билет, непрозрачный для остальной системы.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketPayload(String);

impl TicketPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Сканирует QR-код из PNG и разбирает утверждения, как это делает
    /// сканер на входе в зал.
    pub fn claims(&self) -> Result<TicketClaims, TicketError> {
        let encoded = self
            .0
            .strip_prefix(PAYLOAD_PREFIX)
            .ok_or_else(|| TicketError::Malformed("missing data URI prefix".to_string()))?;
        let png = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TicketError::Malformed(e.to_string()))?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| TicketError::Malformed(e.to_string()))?
            .to_luma8();

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32).0[0],
        );
        let grid = prepared
            .detect_grids()
            .into_iter()
            .next()
            .ok_or_else(|| TicketError::Malformed("no QR code found".to_string()))?;
        let (_, content) = grid
            .decode()
            .map_err(|e| TicketError::Malformed(format!("unreadable QR code: {:?}", e)))?;

        serde_json::from_str(&content).map_err(|e| TicketError::Malformed(e.to_string()))
    }
}

impl From<String> for TicketPayload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub trait TicketIssuer: Send + Sync {
    fn issue(&self, request: &TicketRequest<'_>) -> Result<TicketPayload, TicketError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QrTicketIssuer;

impl QrTicketIssuer {
    fn render_png(content: &[u8]) -> Result<Vec<u8>, TicketError> {
        let code = QrCode::with_error_correction_level(content, EcLevel::M)
            .map_err(|e| TicketError::Render(e.to_string()))?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
            .build();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| TicketError::Render(e.to_string()))?;
        Ok(png)
    }
}

impl TicketIssuer for QrTicketIssuer {
    fn issue(&self, request: &TicketRequest<'_>) -> Result<TicketPayload, TicketError> {
        let (user_id, customer_name) = match request.holder {
            TicketHolder::Requester(id) => (Some(*id), None),
            TicketHolder::Walkin(name) => (None, Some(name.clone())),
        };

        let claims = TicketClaims {
            booking_code: request.booking_code.to_string(),
            studio_id: request.studio_id,
            seat_ids: request.seat_ids.to_vec(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            user_id,
            customer_name,
        };

        let json = serde_json::to_vec(&claims)?;
        let png = Self::render_png(&json)?;
        Ok(TicketPayload(format!(
            "{}{}",
            PAYLOAD_PREFIX,
            general_purpose::STANDARD.encode(png)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn issue(holder: &TicketHolder) -> TicketPayload {
        QrTicketIssuer
            .issue(&TicketRequest {
                booking_code: "BOOK123",
                studio_id: 1,
                seat_ids: &[3, 1, 2],
                holder,
            })
            .unwrap()
    }

    #[test]
    fn online_ticket_carries_user_id_only() {
        let claims = issue(&TicketHolder::Requester(7)).claims().unwrap();

        assert_eq!(claims.booking_code, "BOOK123");
        assert_eq!(claims.studio_id, 1);
        assert_eq!(claims.seat_ids, vec![3, 1, 2]);
        assert_eq!(claims.user_id, Some(7));
        assert_eq!(claims.customer_name, None);
    }

    #[test]
    fn offline_ticket_carries_customer_name_only() {
        let payload = issue(&TicketHolder::Walkin("John Doe".to_string()));
        let claims = payload.claims().unwrap();

        assert_eq!(claims.user_id, None);
        assert_eq!(claims.customer_name.as_deref(), Some("John Doe"));
    }

    #[test]
    fn ticket_is_a_png_image() {
        let payload = issue(&TicketHolder::Requester(1));
        let png = general_purpose::STANDARD
            .decode(payload.as_str().strip_prefix(PAYLOAD_PREFIX).unwrap())
            .unwrap();

        let image = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert!(image.width() >= QR_MIN_SIZE);
        assert_eq!(image.width(), image.height());
    }

    #[test]
    fn identical_inputs_never_produce_identical_payloads() {
        let holder = TicketHolder::Requester(1);
        let first = issue(&holder);
        std::thread::sleep(Duration::from_millis(2));
        let second = issue(&holder);

        assert_ne!(first, second);
    }

    #[test]
    fn booking_codes_are_distinct_uuids() {
        let a = generate_booking_code();
        let b = generate_booking_code();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let json = TicketPayload::from("data:application/json;base64,e30=".to_string());
        let not_png = TicketPayload::from(format!("{}AAAA", PAYLOAD_PREFIX));

        assert!(matches!(json.claims(), Err(TicketError::Malformed(_))));
        assert!(matches!(not_png.claims(), Err(TicketError::Malformed(_))));
    }
}
