//! Клиент внешнего сервиса авторизации.
//!
//! Сервис сам токены не проверяет: он передает их в `POST /api/auth/verify`
//! и получает готового пользователя. Отказ, `valid=false` и недоступность
//! сервиса для вызывающего одинаково означают "не аутентифицирован".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cache::CacheService;
use crate::models::Identity;
use crate::services::circuit_breaker::CircuitBreaker;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected")]
    Rejected,
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
    user: Option<Identity>,
}

#[derive(Clone)]
pub struct HttpAuthVerifier {
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpAuthVerifier {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            circuit_breaker,
        })
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking auth service request");
            return Err(AuthError::Unavailable("circuit breaker is open".to_string()));
        }

        let response = self
            .http_client
            .post(format!("{}/api/auth/verify", self.base_url))
            .json(&VerifyRequest { token })
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_server_error() => {
                self.circuit_breaker.record_failure();
                return Err(AuthError::Unavailable(format!("auth service responded {}", response.status())));
            }
            Ok(response) => {
                self.circuit_breaker.record_success();
                response
            }
            Err(e) => {
                error!("Auth service request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                return Err(AuthError::Unavailable(e.to_string()));
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "Token rejected by auth service");
            return Err(AuthError::Rejected);
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("malformed verify response: {}", e)))?;

        match body.user {
            Some(user) if body.valid => Ok(user),
            _ => Err(AuthError::Rejected),
        }
    }
}

/// Кеширует только успешные проверки и только на `ttl`; отказы всегда
/// уходят во внешний сервис.
pub struct CachingAuthVerifier {
    inner: Arc<dyn AuthVerifier>,
    cache: CacheService,
    ttl_seconds: u64,
}

impl CachingAuthVerifier {
    pub fn new(inner: Arc<dyn AuthVerifier>, cache: CacheService, ttl_seconds: u64) -> Self {
        Self { inner, cache, ttl_seconds }
    }
}

#[async_trait]
impl AuthVerifier for CachingAuthVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if let Some(identity) = self.cache.get_cached_identity(token).await {
            return Ok(identity);
        }

        let identity = self.inner.verify(token).await?;
        if let Err(e) = self.cache.cache_identity(token, &identity, self.ttl_seconds).await {
            warn!("Failed to cache verified identity: {:?}", e);
        }
        Ok(identity)
    }
}
