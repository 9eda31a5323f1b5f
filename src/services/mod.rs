pub mod auth;
pub mod booking;
pub mod circuit_breaker;
pub mod reconciler;
pub mod ticket_validator;
