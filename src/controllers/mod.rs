pub mod bookings;
pub mod seats;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(bookings::routes())
        .merge(seats::routes())
}

/// Полный роутер сервиса.
pub fn app(state: Arc<crate::AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
