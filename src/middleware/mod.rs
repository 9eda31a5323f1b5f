use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::BookingError;
use crate::models::Identity;
use crate::services::auth::AuthError;

/// Покупатель, подтвержденный внешним сервисом авторизации.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

// Bearer extractor: токен проверяет только сервис авторизации
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = BookingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(BookingError::Unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(BookingError::Unauthenticated)?;

        // Отказ и недоступность сервиса для клиента неразличимы
        match state.auth.verify(token).await {
            Ok(identity) => Ok(AuthUser(identity)),
            Err(AuthError::Rejected) => {
                debug!("Bearer token rejected");
                Err(BookingError::Unauthenticated)
            }
            Err(AuthError::Unavailable(reason)) => {
                warn!("Auth service unavailable, treating request as unauthenticated: {}", reason);
                Err(BookingError::Unauthenticated)
            }
        }
    }
}
