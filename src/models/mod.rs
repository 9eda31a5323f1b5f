pub mod user;
pub mod seat;
pub mod booking;

pub use user::Identity;
pub use seat::{Seat, Studio};
pub use booking::{Booking, BookingChannel, BookingStatus, BookingSummary, NewBooking, PendingCompensation};
