use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::{normalize_seat_ids, LedgerError, ReserveOutcome, SeatLedger};
use crate::models::{Seat, Studio};
use crate::services::circuit_breaker::CircuitBreaker;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeatBatchRequest<'a> {
    seat_ids: &'a [i64],
    holder: &'a str,
}

/// Клиент реестра мест, размещенного в другом cinema-сервисе.
///
/// `200` на reserve означает успех, `409` - занятые места; все остальное,
/// включая таймаут, считается отказом вышестоящего сервиса.
#[derive(Clone)]
pub struct HttpSeatLedger {
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpSeatLedger {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, LedgerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Upstream(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            circuit_breaker,
        })
    }

    /// Выполняет запрос, пропуская его через Circuit Breaker. Ответы 5xx
    /// засчитываются как сбой, 4xx - нет.
    async fn execute<F>(&self, operation: F) -> Result<reqwest::Response, LedgerError>
    where
        F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking cinema service request");
            return Err(LedgerError::CircuitOpen);
        }

        match operation.await {
            Ok(response) if response.status().is_server_error() => {
                self.circuit_breaker.record_failure();
                Err(LedgerError::Upstream(format!("cinema service responded {}", response.status())))
            }
            Ok(response) => {
                self.circuit_breaker.record_success();
                Ok(response)
            }
            Err(e) => {
                error!("Cinema service request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                Err(LedgerError::Upstream(e.to_string()))
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SeatLedger for HttpSeatLedger {
    async fn reserve(&self, seat_ids: &[i64], holder: &str) -> Result<ReserveOutcome, LedgerError> {
        let ids = normalize_seat_ids(seat_ids);
        let request = SeatBatchRequest { seat_ids: &ids, holder };

        let response = self
            .execute(
                self.http_client
                    .post(self.url("/api/cinema/seats/reserve"))
                    .json(&request)
                    .send(),
            )
            .await?;

        match response.status() {
            status if status.is_success() => Ok(ReserveOutcome::Reserved),
            StatusCode::CONFLICT => Ok(ReserveOutcome::Unavailable),
            status => Err(LedgerError::Upstream(format!("unexpected reserve status {}", status))),
        }
    }

    async fn release(&self, seat_ids: &[i64], holder: &str) -> Result<(), LedgerError> {
        let ids = normalize_seat_ids(seat_ids);
        let request = SeatBatchRequest { seat_ids: &ids, holder };

        let response = self
            .execute(
                self.http_client
                    .post(self.url("/api/cinema/seats/release"))
                    .json(&request)
                    .send(),
            )
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LedgerError::Upstream(format!("unexpected release status {}", response.status())))
        }
    }

    async fn list_seats(&self, studio_id: i64) -> Result<Vec<Seat>, LedgerError> {
        let response = self
            .execute(
                self.http_client
                    .get(self.url(&format!("/api/cinema/studios/{}/seats", studio_id)))
                    .send(),
            )
            .await?;

        if !response.status().is_success() {
            return Err(LedgerError::Upstream(format!("unexpected seats status {}", response.status())));
        }

        response
            .json::<Vec<Seat>>()
            .await
            .map_err(|e| LedgerError::Upstream(e.to_string()))
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, LedgerError> {
        let response = self
            .execute(self.http_client.get(self.url("/api/cinema/studios")).send())
            .await?;

        if !response.status().is_success() {
            return Err(LedgerError::Upstream(format!("unexpected studios status {}", response.status())));
        }

        response
            .json::<Vec<Studio>>()
            .await
            .map_err(|e| LedgerError::Upstream(e.to_string()))
    }
}
