use crate::config::AppConfig;
use crate::services::lifecycle::BookingManager;

pub struct AppState {
    pub config: AppConfig,
    pub bookings: BookingManager,
}
