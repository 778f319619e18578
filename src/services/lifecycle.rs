use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::errors::AppError;
use crate::models::dates::{available_dates, is_within_window};
use crate::models::{generate_slots, Booking, BookingForm, BookingPage, PaymentStatus, Slot};
use crate::services::availability::{conflicting_slot_ids, has_elapsed, reconcile};
use crate::services::screenshot::Screenshot;
use crate::services::store::{BookingFilter, BookingStore};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Created,
    Approved,
    Rejected,
    Removed,
}

/// Pushed to subscribers after every mutation so they can re-read availability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking_id: String,
    pub date: NaiveDate,
}

/// The booking list and the reconciled slots of one date, read after a mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refreshed {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBooking {
    pub id: String,
    pub booking: Booking,
    pub refreshed: Refreshed,
}

/// Owns the booking store. All mutations go through here.
pub struct BookingManager {
    store: BookingStore,
    events: broadcast::Sender<BookingEvent>,
    window_days: usize,
    clock: fn() -> DateTime<Utc>,
}

impl BookingManager {
    pub fn new(store: BookingStore, window_days: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            events,
            window_days,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &BookingStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn available_dates(&self) -> Vec<NaiveDate> {
        available_dates(self.today(), self.window_days)
    }

    // ── Reads ──

    pub async fn bookings(&self) -> Result<Vec<Booking>, AppError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn bookings_for_date(
        &self,
        date: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Booking>, AppError> {
        Ok(self.store.list_for_date(date, limit).await?)
    }

    pub async fn bookings_page(
        &self,
        page: usize,
        page_size: usize,
        date: Option<NaiveDate>,
    ) -> Result<BookingPage, AppError> {
        Ok(self.store.list_paginated(page, page_size, date).await?)
    }

    pub async fn bookings_for_mobile(
        &self,
        mobile_number: &str,
        limit: usize,
    ) -> Result<Vec<Booking>, AppError> {
        Ok(self.store.list_for_mobile(mobile_number, limit).await?)
    }

    /// Slots for `date` with availability derived from the latest bookings.
    pub async fn slots_for_date(&self, date: NaiveDate) -> Result<Vec<Slot>, AppError> {
        let filter = BookingFilter {
            date: Some(date),
            held_only: true,
            ..BookingFilter::default()
        };
        let held = self.store.list(&filter, None).await?;
        Ok(reconcile(&self.store.slots_for_date(date, self.today()), &held, date))
    }

    /// Selects `slot_ids` on `form` against live availability.
    pub async fn select_slots(
        &self,
        form: &mut BookingForm,
        slot_ids: &[String],
    ) -> Result<(), AppError> {
        let slots = self.slots_for_date(form.date).await?;
        let mut taken = Vec::new();

        for id in slot_ids {
            let Some(slot) = slots.iter().find(|s| s.id == *id) else {
                return Err(AppError::Validation(format!(
                    "unknown slot {id} for {}",
                    form.date
                )));
            };
            if !slot.is_available {
                taken.push(id.clone());
                continue;
            }
            form.select_slot(slot);
        }

        if !taken.is_empty() {
            return Err(AppError::SlotConflict(taken));
        }
        Ok(())
    }

    // ── Mutations ──

    pub async fn create(
        &self,
        form: &mut BookingForm,
        payment_screenshot: Option<String>,
    ) -> Result<CreatedBooking, AppError> {
        let now = self.now();
        let slots = self.validate(form, now)?;

        let payment_screenshot = match payment_screenshot.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Screenshot::stored_form(raw).ok_or_else(|| {
                AppError::Validation(
                    "payment screenshot must be a png, jpeg, webp or gif data URI or an http(s) URL"
                        .to_string(),
                )
            })?),
        };

        let held = self
            .store
            .list_for_write(
                &BookingFilter {
                    date: Some(form.date),
                    held_only: true,
                    ..BookingFilter::default()
                },
                None,
            )
            .await?;
        let taken = conflicting_slot_ids(&held, form.date, slots.iter().map(|s| s.id.as_str()));
        if !taken.is_empty() {
            return Err(AppError::SlotConflict(taken));
        }

        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: form.full_name.trim().to_string(),
            mobile_number: form.mobile_number.trim().to_string(),
            date: form.date,
            total_amount: slots.iter().map(|s| s.price).sum(),
            slots,
            created_at: now,
            payment_status: PaymentStatus::Pending,
            payment_screenshot,
        };

        self.store.insert(&booking).await?;
        tracing::info!(
            booking_id = %booking.id,
            date = %booking.date,
            slots = booking.slots.len(),
            total = booking.total_amount,
            "booking created"
        );

        form.reset(self.today());
        let refreshed = self.refresh(booking.date).await?;
        self.publish(BookingEventKind::Created, &booking);

        Ok(CreatedBooking {
            id: booking.id.clone(),
            booking,
            refreshed,
        })
    }

    pub async fn approve(&self, id: &str) -> Result<Refreshed, AppError> {
        self.transition(id, PaymentStatus::Approved).await
    }

    pub async fn reject(&self, id: &str) -> Result<Refreshed, AppError> {
        self.transition(id, PaymentStatus::Rejected).await
    }

    pub async fn remove(&self, id: &str) -> Result<Refreshed, AppError> {
        let booking = self.find(id).await?;
        if !self.store.delete(id).await? {
            return Err(AppError::NotFound(format!("booking {id}")));
        }
        tracing::info!(booking_id = %id, date = %booking.date, "booking removed");

        let refreshed = self.refresh(booking.date).await?;
        self.publish(BookingEventKind::Removed, &booking);
        Ok(refreshed)
    }

    async fn transition(&self, id: &str, next: PaymentStatus) -> Result<Refreshed, AppError> {
        let booking = self.find(id).await?;
        if !booking.payment_status.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "booking is already {}",
                booking.payment_status.as_str()
            )));
        }

        if !self.store.update_status(id, next).await? {
            return Err(AppError::NotFound(format!("booking {id}")));
        }
        tracing::info!(booking_id = %id, status = next.as_str(), "payment status updated");

        let refreshed = self.refresh(booking.date).await?;
        let kind = match next {
            PaymentStatus::Rejected => BookingEventKind::Rejected,
            _ => BookingEventKind::Approved,
        };
        self.publish(kind, &booking);
        Ok(refreshed)
    }

    async fn find(&self, id: &str) -> Result<Booking, AppError> {
        self.store
            .get_for_write(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
    }

    async fn refresh(&self, date: NaiveDate) -> Result<Refreshed, AppError> {
        let bookings = self.store.list_all().await?;
        let raw = self.store.slots_for_date(date, self.today());
        let slots = reconcile(&raw, &bookings, date);
        Ok(Refreshed {
            date,
            slots,
            bookings,
        })
    }

    fn publish(&self, kind: BookingEventKind, booking: &Booking) {
        // No subscribers is fine.
        let _ = self.events.send(BookingEvent {
            kind,
            booking_id: booking.id.clone(),
            date: booking.date,
        });
    }

    /// Checks the form and returns its slots re-priced from the generator.
    fn validate(&self, form: &BookingForm, now: DateTime<Utc>) -> Result<Vec<Slot>, AppError> {
        if form.selected_slots.is_empty() {
            return Err(AppError::Validation(
                "select at least one slot".to_string(),
            ));
        }
        if form.full_name.trim().is_empty() {
            return Err(AppError::Validation("full name is required".to_string()));
        }
        let mobile = form.mobile_number.trim();
        if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(
                "mobile number must be 10 digits".to_string(),
            ));
        }
        if !is_within_window(form.date, now.date_naive(), self.window_days) {
            return Err(AppError::Validation(format!(
                "{} is outside the booking window",
                form.date
            )));
        }

        let canonical = generate_slots(form.date);
        let mut slots = Vec::with_capacity(form.selected_slots.len());
        for selected in &form.selected_slots {
            let Some(slot) = canonical.iter().find(|s| s.id == selected.id) else {
                return Err(AppError::Validation(format!(
                    "slot {} is not on {}",
                    selected.id, form.date
                )));
            };
            if has_elapsed(slot, now) {
                return Err(AppError::Validation(format!(
                    "slot {} has already ended",
                    slot.time
                )));
            }
            if !slots.iter().any(|s: &Slot| s.id == slot.id) {
                slots.push(slot.clone());
            }
        }
        Ok(slots)
    }
}
