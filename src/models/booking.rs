use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::slot::Slot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub full_name: String,
    pub mobile_number: String,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub created_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_screenshot: Option<String>,
    pub total_amount: i64,
}

impl Booking {
    /// Pending and approved bookings keep their slots off the grid.
    pub fn holds_slots(&self) -> bool {
        self.payment_status != PaymentStatus::Rejected
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            _ => PaymentStatus::Pending,
        }
    }

    /// Only pending bookings move, and only to a terminal state.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Approved)
                | (PaymentStatus::Pending, PaymentStatus::Rejected)
        )
    }
}

/// One page of bookings plus the number of matching records across all pages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total_count: usize,
}

/// The in-progress booking a customer is assembling. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingForm {
    pub full_name: String,
    pub mobile_number: String,
    pub date: NaiveDate,
    pub selected_slots: Vec<Slot>,
}

impl BookingForm {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            full_name: String::new(),
            mobile_number: String::new(),
            date,
            selected_slots: Vec::new(),
        }
    }

    /// Changing the date drops the current selection.
    pub fn set_date(&mut self, date: NaiveDate) {
        if date != self.date {
            self.date = date;
            self.selected_slots.clear();
        }
    }

    /// Adds `slot` unless it is unavailable, on another date, or already selected.
    pub fn select_slot(&mut self, slot: &Slot) -> bool {
        if !slot.is_available
            || slot.date != self.date
            || self.selected_slots.iter().any(|s| s.id == slot.id)
        {
            return false;
        }
        self.selected_slots.push(slot.clone());
        true
    }

    pub fn deselect_slot(&mut self, slot_id: &str) {
        self.selected_slots.retain(|s| s.id != slot_id);
    }

    pub fn total_amount(&self) -> i64 {
        self.selected_slots.iter().map(|s| s.price).sum()
    }

    pub fn reset(&mut self, date: NaiveDate) {
        *self = Self::new(date);
    }
}
