pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/dates", get(handlers::booking::get_dates))
        .route("/api/slots", get(handlers::booking::get_slots))
        .route("/api/bookings", post(handlers::booking::create_booking))
        .route("/api/bookings/status", get(handlers::booking::booking_status))
        .route("/api/events", get(handlers::events::events_stream))
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route("/api/admin/init", post(handlers::admin::init_store))
        .route("/api/admin/backend", post(handlers::admin::set_backend))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/recent",
            get(handlers::admin::get_recent_bookings),
        )
        .route(
            "/api/admin/bookings/:id",
            axum::routing::delete(handlers::admin::delete_booking),
        )
        .route(
            "/api/admin/bookings/:id/approve",
            post(handlers::admin::approve_booking),
        )
        .route(
            "/api/admin/bookings/:id/reject",
            post(handlers::admin::reject_booking),
        )
        .route(
            "/api/admin/bookings/:id/screenshot",
            get(handlers::admin::get_screenshot),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
