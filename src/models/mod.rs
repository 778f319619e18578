pub mod booking;
pub mod dates;
pub mod slot;

pub use booking::{Booking, BookingForm, BookingPage, PaymentStatus};
pub use dates::available_dates;
pub use slot::{generate_slots, price_for_hour, Slot};
