use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::models::{Booking, Slot};

/// Ids of slots on `date` held by a pending or approved booking.
pub fn held_slot_ids(bookings: &[Booking], date: NaiveDate) -> HashSet<&str> {
    bookings
        .iter()
        .filter(|b| b.date == date && b.holds_slots())
        .flat_map(|b| b.slot_ids())
        .collect()
}

/// Annotates `slots` with live availability derived from `bookings`.
pub fn reconcile(slots: &[Slot], bookings: &[Booking], date: NaiveDate) -> Vec<Slot> {
    let held = held_slot_ids(bookings, date);
    slots
        .iter()
        .map(|slot| Slot {
            is_available: !held.contains(slot.id.as_str()),
            ..slot.clone()
        })
        .collect()
}

/// The subset of `wanted` slot ids already held on `date`, in request order.
pub fn conflicting_slot_ids<'a>(
    bookings: &[Booking],
    date: NaiveDate,
    wanted: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let held = held_slot_ids(bookings, date);
    wanted
        .into_iter()
        .filter(|id| held.contains(*id))
        .map(str::to_string)
        .collect()
}

/// True once the hour-long slot on `now`'s date has finished.
pub fn has_elapsed(slot: &Slot, now: DateTime<Utc>) -> bool {
    if slot.date != now.date_naive() {
        return slot.date < now.date_naive();
    }
    slot.hour().map(|hour| hour < now.hour()).unwrap_or(false)
}
