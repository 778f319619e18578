pub mod local;
pub mod normalize;
pub mod supabase;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::StoreError;
use crate::models::{generate_slots, Booking, BookingPage, PaymentStatus, Slot};

pub use local::LocalBackend;
pub use supabase::SupabaseBackend;

pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub date: Option<NaiveDate>,
    pub mobile_number: Option<String>,
    /// Skip rejected bookings.
    pub held_only: bool,
}

impl BookingFilter {
    pub fn for_date(date: Option<NaiveDate>) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.date.map_or(true, |d| booking.date == d)
            && self
                .mobile_number
                .as_deref()
                .map_or(true, |m| booking.mobile_number == m)
            && (!self.held_only || booking.holds_slots())
    }
}

/// A place bookings live. Every list is ordered newest `created_at` first.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap check that the backing table or key space is usable.
    async fn probe(&self) -> Result<(), StoreError>;

    /// Creates the backing schema if the backend can. Local storage needs none.
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    async fn list(
        &self,
        filter: &BookingFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// `page` is 1-indexed.
    async fn list_page(
        &self,
        filter: &BookingFilter,
        page: usize,
        page_size: usize,
    ) -> Result<BookingPage, StoreError>;

    /// Returns false when no booking has `id`.
    async fn update_status(&self, id: &str, status: PaymentStatus) -> Result<bool, StoreError>;

    /// Returns false when no booking has `id`.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub backend: &'static str,
    pub use_local: bool,
    pub remote_configured: bool,
    pub initialized: bool,
}

enum Active<'a> {
    Local,
    Remote(&'a dyn BookingBackend),
    Uninitialized,
}

enum Degraded {
    Empty,
    Local,
}

/// The booking list shared by every caller, served by whichever backend the
/// persisted flag selects.
pub struct BookingStore {
    local: LocalBackend,
    remote: Option<Box<dyn BookingBackend>>,
    use_local: AtomicBool,
    initialized: AtomicBool,
}

impl BookingStore {
    pub fn new(
        local: LocalBackend,
        remote: Option<Box<dyn BookingBackend>>,
    ) -> Result<Self, StoreError> {
        let use_local = match &remote {
            None => true,
            Some(_) => local.use_local_flag()?.unwrap_or(false),
        };

        tracing::info!(
            backend = if use_local { "local" } else { "remote" },
            remote_configured = remote.is_some(),
            "booking store ready"
        );

        Ok(Self {
            local,
            remote,
            use_local: AtomicBool::new(use_local),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn local_only(local: LocalBackend) -> Self {
        Self {
            local,
            remote: None,
            use_local: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn uses_local(&self) -> bool {
        self.use_local.load(Ordering::SeqCst)
    }

    /// Whether the remote table answered the last probe.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            backend: match self.active() {
                Active::Local => self.local.name(),
                Active::Remote(remote) => remote.name(),
                Active::Uninitialized => "uninitialized",
            },
            use_local: self.uses_local(),
            remote_configured: self.has_remote(),
            initialized: self.is_initialized(),
        }
    }

    /// Checks the remote table and records whether it is usable.
    pub async fn probe(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };

        let ok = match remote.probe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = remote.name(), error = %e, "remote probe failed");
                false
            }
        };
        self.initialized.store(ok, Ordering::SeqCst);
        ok
    }

    /// Applies the remote schema, then re-probes. Returns whether the remote
    /// table is usable afterwards.
    pub async fn initialize(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };

        match remote.initialize().await {
            Ok(()) => tracing::info!(backend = remote.name(), "applied remote schema"),
            Err(e) => {
                tracing::warn!(backend = remote.name(), error = %e, "remote schema not applied")
            }
        }
        self.probe().await
    }

    /// Persists the backend choice. Switching to remote re-probes it.
    pub async fn set_use_local(&self, use_local: bool) -> Result<(), StoreError> {
        if !use_local && self.remote.is_none() {
            return Err(StoreError::Persistence(
                "remote backend is not configured".to_string(),
            ));
        }

        self.local.set_use_local_flag(use_local)?;
        self.use_local.store(use_local, Ordering::SeqCst);
        tracing::info!(use_local, "switched booking backend");

        if !use_local {
            self.probe().await;
        }
        Ok(())
    }

    fn active(&self) -> Active<'_> {
        if self.uses_local() {
            return Active::Local;
        }
        match &self.remote {
            Some(remote) if self.is_initialized() => Active::Remote(remote.as_ref()),
            Some(_) => Active::Uninitialized,
            None => Active::Local,
        }
    }

    fn degrade(&self, err: StoreError, op: &str) -> Degraded {
        if let StoreError::NotInitialized = err {
            tracing::warn!(op, "remote booking table missing, treating as empty");
            self.initialized.store(false, Ordering::SeqCst);
            return Degraded::Empty;
        }
        tracing::warn!(op, error = %err, "remote read failed, falling back to local store");
        Degraded::Local
    }

    fn writer(&self) -> Result<&dyn BookingBackend, StoreError> {
        match self.active() {
            Active::Local => Ok(&self.local),
            Active::Remote(remote) => Ok(remote),
            Active::Uninitialized => Err(StoreError::NotInitialized),
        }
    }

    fn note_write_error(&self, err: StoreError, op: &str) -> StoreError {
        if let StoreError::NotInitialized = err {
            self.initialized.store(false, Ordering::SeqCst);
        }
        tracing::error!(op, error = %err, "booking write failed");
        err
    }

    // ── Reads ──

    pub async fn list(
        &self,
        filter: &BookingFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Booking>, StoreError> {
        match self.active() {
            Active::Local => self.local.list(filter, limit).await,
            Active::Uninitialized => Ok(Vec::new()),
            Active::Remote(remote) => match remote.list(filter, limit).await {
                Ok(bookings) => Ok(bookings),
                Err(err) => match self.degrade(err, "list") {
                    Degraded::Empty => Ok(Vec::new()),
                    Degraded::Local => self.local.list(filter, limit).await,
                },
            },
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        match self.active() {
            Active::Local => self.local.get(id).await,
            Active::Uninitialized => Ok(None),
            Active::Remote(remote) => match remote.get(id).await {
                Ok(booking) => Ok(booking),
                Err(err) => match self.degrade(err, "get") {
                    Degraded::Empty => Ok(None),
                    Degraded::Local => self.local.get(id).await,
                },
            },
        }
    }

    /// A list read that guards a write. It always hits the write target: no local
    /// fallback, and a missing remote table is an error rather than empty.
    pub async fn list_for_write(
        &self,
        filter: &BookingFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Booking>, StoreError> {
        self.writer()?
            .list(filter, limit)
            .await
            .map_err(|e| self.note_write_error(e, "list_for_write"))
    }

    /// Like [`BookingStore::get`], but against the write target only.
    pub async fn get_for_write(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        self.writer()?
            .get(id)
            .await
            .map_err(|e| self.note_write_error(e, "get_for_write"))
    }

    pub async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        self.list(&BookingFilter::default(), None).await
    }

    pub async fn list_for_date(
        &self,
        date: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        self.list(&BookingFilter::for_date(date), Some(limit)).await
    }

    pub async fn list_for_mobile(
        &self,
        mobile_number: &str,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let filter = BookingFilter {
            mobile_number: Some(mobile_number.to_string()),
            ..BookingFilter::default()
        };
        self.list(&filter, Some(limit)).await
    }

    pub async fn list_paginated(
        &self,
        page: usize,
        page_size: usize,
        date_filter: Option<NaiveDate>,
    ) -> Result<BookingPage, StoreError> {
        let filter = BookingFilter::for_date(date_filter);
        let page = page.max(1);
        let page_size = page_size.max(1);
        let empty = || BookingPage {
            bookings: Vec::new(),
            total_count: 0,
        };

        match self.active() {
            Active::Local => self.local.list_page(&filter, page, page_size).await,
            Active::Uninitialized => Ok(empty()),
            Active::Remote(remote) => match remote.list_page(&filter, page, page_size).await {
                Ok(page) => Ok(page),
                Err(err) => match self.degrade(err, "list_page") {
                    Degraded::Empty => Ok(empty()),
                    Degraded::Local => self.local.list_page(&filter, page, page_size).await,
                },
            },
        }
    }

    /// The raw slot set for `date`. Local mode serves it from the slot cache,
    /// which only keeps dates from `today` on.
    pub fn slots_for_date(&self, date: NaiveDate, today: NaiveDate) -> Vec<Slot> {
        if !self.uses_local() {
            return generate_slots(date);
        }
        self.local.cached_slots(date, today).unwrap_or_else(|e| {
            tracing::warn!(%date, error = %e, "slot cache unreadable, regenerating");
            generate_slots(date)
        })
    }

    // ── Writes ──

    pub async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let backend = self.writer()?;
        backend
            .insert(booking)
            .await
            .map_err(|e| self.note_write_error(e, "insert"))?;
        tracing::info!(booking_id = %booking.id, date = %booking.date, backend = backend.name(), "booking stored");
        Ok(())
    }

    pub async fn update_status(&self, id: &str, status: PaymentStatus) -> Result<bool, StoreError> {
        let backend = self.writer()?;
        let updated = backend
            .update_status(id, status)
            .await
            .map_err(|e| self.note_write_error(e, "update_status"))?;
        if !updated {
            tracing::warn!(booking_id = %id, "status update for unknown booking ignored");
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let backend = self.writer()?;
        backend
            .delete(id)
            .await
            .map_err(|e| self.note_write_error(e, "delete"))
    }
}
