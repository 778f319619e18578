use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_password: String,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub bookings_table: String,
    pub booking_window_days: usize,
    pub admin_page_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "cricketbox.db".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "changeme".to_string()),
            supabase_url: env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty()),
            supabase_key: env::var("SUPABASE_ANON_KEY").ok().filter(|v| !v.is_empty()),
            bookings_table: env::var("BOOKINGS_TABLE")
                .unwrap_or_else(|_| "cricket_bookings".to_string()),
            booking_window_days: env::var("BOOKING_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(14),
            admin_page_size: env::var("ADMIN_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(10),
        }
    }

    /// Remote credentials, present only when both the URL and key are set.
    pub fn supabase_credentials(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}
