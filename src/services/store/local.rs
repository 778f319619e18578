use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};

use super::normalize::booking_from_value;
use super::{BookingBackend, BookingFilter};
use crate::db::queries::{self, BOOKINGS_KEY, SLOTS_KEY};
use crate::errors::StoreError;
use crate::models::{generate_slots, Booking, BookingPage, PaymentStatus, Slot};
use crate::services::availability::conflicting_slot_ids;

/// Bookings kept as one JSON list in the local key-value table.
#[derive(Clone)]
pub struct LocalBackend {
    conn: Arc<Mutex<Connection>>,
}

impl LocalBackend {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Persistence("local store lock poisoned".to_string()))
    }

    pub fn use_local_flag(&self) -> Result<Option<bool>, StoreError> {
        let conn = self.lock()?;
        Ok(queries::get_use_local(&conn)?)
    }

    pub fn set_use_local_flag(&self, use_local: bool) -> Result<(), StoreError> {
        let conn = self.lock()?;
        queries::set_use_local(&conn, use_local)?;
        Ok(())
    }

    /// Cached slots for `date`, generating and caching them on first use.
    /// Dates before `today` are dropped whenever the cache is rewritten.
    pub fn cached_slots(&self, date: NaiveDate, today: NaiveDate) -> Result<Vec<Slot>, StoreError> {
        let conn = self.lock()?;
        let mut all: Vec<Slot> = match queries::kv_get(&conn, SLOTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable slot cache");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let cached: Vec<Slot> = all.iter().filter(|s| s.date == date).cloned().collect();
        if !cached.is_empty() {
            return Ok(cached);
        }

        let generated = generate_slots(date);
        all.retain(|s| s.date >= today);
        all.extend(generated.iter().cloned());
        queries::kv_set(&conn, SLOTS_KEY, &serde_json::to_string(&all)?)?;
        Ok(generated)
    }
}

/// Newest first. Records that cannot be normalised are skipped.
fn load(conn: &Connection) -> Result<Vec<Booking>, StoreError> {
    let Some(raw) = queries::kv_get(conn, BOOKINGS_KEY)? else {
        return Ok(Vec::new());
    };

    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let Some(items) = value.as_array() else {
        return Err(StoreError::Persistence(
            "stored booking list is not an array".to_string(),
        ));
    };

    let mut bookings: Vec<Booking> = items
        .iter()
        .filter_map(|item| match booking_from_value(item) {
            Ok(booking) => Some(booking),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable local booking");
                None
            }
        })
        .collect();
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(bookings)
}

fn save(conn: &Connection, bookings: &[Booking]) -> Result<(), StoreError> {
    queries::kv_set(conn, BOOKINGS_KEY, &serde_json::to_string(bookings)?)?;
    Ok(())
}

#[async_trait]
impl BookingBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        load(&conn).map(|_| ())
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut bookings = load(&tx)?;
        if bookings.iter().any(|b| b.id == booking.id) {
            return Err(StoreError::Persistence(format!(
                "booking {} already exists",
                booking.id
            )));
        }

        let taken = conflicting_slot_ids(&bookings, booking.date, booking.slot_ids());
        if !taken.is_empty() {
            return Err(StoreError::SlotConflict(taken));
        }

        bookings.insert(0, booking.clone());
        save(&tx, &bookings)?;
        tx.commit()?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let conn = self.lock()?;
        Ok(load(&conn)?.into_iter().find(|b| b.id == id))
    }

    async fn list(
        &self,
        filter: &BookingFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Booking>, StoreError> {
        let conn = self.lock()?;
        Ok(load(&conn)?
            .into_iter()
            .filter(|b| filter.matches(b))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn list_page(
        &self,
        filter: &BookingFilter,
        page: usize,
        page_size: usize,
    ) -> Result<BookingPage, StoreError> {
        let conn = self.lock()?;
        let matching: Vec<Booking> = load(&conn)?.into_iter().filter(|b| filter.matches(b)).collect();
        let total_count = matching.len();
        let start = page.saturating_sub(1).saturating_mul(page_size);

        Ok(BookingPage {
            bookings: matching.into_iter().skip(start).take(page_size).collect(),
            total_count,
        })
    }

    async fn update_status(&self, id: &str, status: PaymentStatus) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut bookings = load(&tx)?;
        let Some(booking) = bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        booking.payment_status = status;

        save(&tx, &bookings)?;
        tx.commit()?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut bookings = load(&tx)?;
        let before = bookings.len();
        bookings.retain(|b| b.id != id);
        if bookings.len() == before {
            return Ok(false);
        }

        save(&tx, &bookings)?;
        tx.commit()?;
        Ok(true)
    }
}
