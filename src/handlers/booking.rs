use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::dates::is_within_window;
use crate::models::{Booking, BookingForm, Slot};
use crate::services::availability::has_elapsed;
use crate::services::store::DEFAULT_LIST_LIMIT;
use crate::state::AppState;

// GET /api/dates
#[derive(Serialize)]
pub struct DatesResponse {
    today: NaiveDate,
    dates: Vec<NaiveDate>,
}

pub async fn get_dates(State(state): State<Arc<AppState>>) -> Json<DatesResponse> {
    Json(DatesResponse {
        today: state.bookings.today(),
        dates: state.bookings.available_dates(),
    })
}

// GET /api/slots?date=YYYY-MM-DD
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    #[serde(flatten)]
    slot: Slot,
    /// Already over; shown but not selectable.
    is_past: bool,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    date: NaiveDate,
    slots: Vec<SlotView>,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let today = state.bookings.today();
    let date = query.date.unwrap_or(today);
    if !is_within_window(date, today, state.config.booking_window_days) {
        return Err(AppError::Validation(format!(
            "{date} is outside the booking window"
        )));
    }

    let now = state.bookings.now();
    let slots = state
        .bookings
        .slots_for_date(date)
        .await?
        .into_iter()
        .map(|slot| SlotView {
            is_past: has_elapsed(&slot, now),
            slot,
        })
        .collect();

    Ok(Json(SlotsResponse { date, slots }))
}

// POST /api/bookings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub full_name: String,
    pub mobile_number: String,
    pub date: NaiveDate,
    pub slot_ids: Vec<String>,
    #[serde(default)]
    pub payment_screenshot: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    id: String,
    total_amount: i64,
    booking: Booking,
    slots: Vec<Slot>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let mut form = BookingForm::new(body.date);
    form.full_name = body.full_name;
    form.mobile_number = body.mobile_number;
    state.bookings.select_slots(&mut form, &body.slot_ids).await?;

    let created = state
        .bookings
        .create(&mut form, body.payment_screenshot)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            id: created.id,
            total_amount: created.booking.total_amount,
            booking: created.booking,
            slots: created.refreshed.slots,
        }),
    ))
}

// GET /api/bookings/status?mobileNumber=
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub mobile_number: String,
}

pub async fn booking_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let mobile = query.mobile_number.trim();
    if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "mobile number must be 10 digits".to_string(),
        ));
    }

    let bookings = state
        .bookings
        .bookings_for_mobile(mobile, DEFAULT_LIST_LIMIT)
        .await?
        .into_iter()
        // Screenshots are for the admin only.
        .map(|b| Booking {
            payment_screenshot: None,
            ..b
        })
        .collect();

    Ok(Json(bookings))
}
