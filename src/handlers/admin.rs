use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::Booking;
use crate::services::lifecycle::Refreshed;
use crate::services::screenshot::Screenshot;
use crate::services::store::{StoreStatus, DEFAULT_LIST_LIMIT};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_password: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_password {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/status
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    store: StoreStatus,
    today: NaiveDate,
    window_days: usize,
    page_size: usize,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    Ok(Json(StatusResponse {
        store: state.bookings.store().status(),
        today: state.bookings.today(),
        window_days: state.config.booking_window_days,
        page_size: state.config.admin_page_size,
    }))
}

// POST /api/admin/init
pub async fn init_store(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StoreStatus>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let store = state.bookings.store();
    if store.has_remote() && !store.initialize().await {
        tracing::warn!("remote booking table still unavailable");
    }
    Ok(Json(store.status()))
}

// POST /api/admin/backend
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRequest {
    pub use_local: bool,
}

pub async fn set_backend(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BackendRequest>,
) -> Result<Json<StoreStatus>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let store = state.bookings.store();
    if !body.use_local && !store.has_remote() {
        return Err(AppError::Validation(
            "remote backend is not configured".to_string(),
        ));
    }
    store.set_use_local(body.use_local).await?;
    Ok(Json(store.status()))
}

// GET /api/admin/bookings?page=&pageSize=&date=
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsPageResponse {
    bookings: Vec<Booking>,
    total_count: usize,
    page: usize,
    page_size: usize,
    total_pages: usize,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<BookingsPageResponse>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(state.config.admin_page_size)
        .clamp(1, DEFAULT_LIST_LIMIT);

    let result = state
        .bookings
        .bookings_page(page, page_size, query.date)
        .await?;

    Ok(Json(BookingsPageResponse {
        total_pages: result.total_count.div_ceil(page_size),
        bookings: result.bookings,
        total_count: result.total_count,
        page,
        page_size,
    }))
}

// GET /api/admin/bookings/recent?date=&limit=
#[derive(Deserialize)]
pub struct RecentQuery {
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

pub async fn get_recent_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
    let bookings = state.bookings.bookings_for_date(query.date, limit).await?;
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/approve
pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Refreshed>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;
    Ok(Json(state.bookings.approve(&id).await?))
}

// POST /api/admin/bookings/:id/reject
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Refreshed>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;
    Ok(Json(state.bookings.reject(&id).await?))
}

// DELETE /api/admin/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Refreshed>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;
    Ok(Json(state.bookings.remove(&id).await?))
}

// GET /api/admin/bookings/:id/screenshot
pub async fn get_screenshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let booking = state
        .bookings
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    let raw = booking
        .payment_screenshot
        .ok_or_else(|| AppError::NotFound(format!("screenshot for booking {id}")))?;

    let location = match Screenshot::parse(&raw) {
        Some(Screenshot::Inline { mime, bytes }) => {
            let headers = [
                (header::CONTENT_TYPE, mime),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                (header::CONTENT_DISPOSITION, "inline".to_string()),
            ];
            return Ok((headers, bytes).into_response());
        }
        Some(Screenshot::Url(url)) => HeaderValue::from_str(&url).ok(),
        None => None,
    };

    match location {
        Some(location) => {
            Ok((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response())
        }
        None => {
            tracing::warn!(booking_id = %id, "stored screenshot is unreadable");
            Err(AppError::NotFound(format!("screenshot for booking {id}")))
        }
    }
}
