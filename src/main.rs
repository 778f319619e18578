use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use cricketbox::config::AppConfig;
use cricketbox::db;
use cricketbox::services::lifecycle::BookingManager;
use cricketbox::services::store::{BookingBackend, BookingStore, LocalBackend, SupabaseBackend};
use cricketbox::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let local = LocalBackend::new(Arc::new(Mutex::new(conn)));

    let remote: Option<Box<dyn BookingBackend>> = match config.supabase_credentials() {
        Some((url, key)) => {
            tracing::info!("using Supabase bookings table {} at {url}", config.bookings_table);
            Some(Box::new(SupabaseBackend::new(
                url,
                key.to_string(),
                &config.bookings_table,
            )))
        }
        None => {
            tracing::info!("SUPABASE_URL/SUPABASE_ANON_KEY not set, bookings stay local");
            None
        }
    };

    let store = BookingStore::new(local, remote)?;
    if store.has_remote() && !store.probe().await {
        tracing::warn!(
            "bookings table {} is not reachable, reads return empty until it is created",
            config.bookings_table
        );
    }

    let state = Arc::new(AppState {
        bookings: BookingManager::new(store, config.booking_window_days),
        config: config.clone(),
    });

    let app = cricketbox::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
