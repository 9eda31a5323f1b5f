use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

use crate::error::BookingError;
use crate::models::BookingSummary;
use crate::store::BookingStore;

/// Погашение билетов: `active -> used` ровно один раз.
///
/// Неизвестный код и уже погашенный билет дают один и тот же
/// [`BookingError::InvalidOrUsedTicket`], чтобы по ответам нельзя было
/// перебирать существующие коды. Места при погашении не освобождаются.
#[derive(Clone)]
pub struct TicketValidator {
    store: Arc<dyn BookingStore>,
    step_timeout: Duration,
}

impl TicketValidator {
    pub fn new(store: Arc<dyn BookingStore>, step_timeout: Duration) -> Self {
        Self { store, step_timeout }
    }

    pub async fn redeem(&self, booking_code: &str) -> Result<BookingSummary, BookingError> {
        let code = booking_code.trim();
        if code.is_empty() {
            return Err(BookingError::InvalidOrUsedTicket);
        }

        match timeout(self.step_timeout, self.store.redeem(code)).await {
            Ok(Ok(Some(booking))) => {
                info!(booking_code = %booking.booking_code, studio_id = booking.studio_id, "Ticket redeemed");
                Ok(BookingSummary::from(&booking))
            }
            Ok(Ok(None)) => {
                info!("Redemption rejected: invalid or used ticket");
                Err(BookingError::InvalidOrUsedTicket)
            }
            Ok(Err(e)) => {
                error!("Failed to redeem ticket: {:?}", e);
                Err(e.into())
            }
            Err(_) => Err(BookingError::Persistence("ticket redemption timed out".to_string())),
        }
    }
}
