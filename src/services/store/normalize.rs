//! Adapter from loosely-shaped stored records to [`Booking`].
//!
//! Records reach us from the remote table (snake_case columns), the local
//! key-value list (camelCase) and older exports that used other names. Each
//! field is looked up through a fixed list of keys, first match wins:
//!
//! | field               | keys, in priority order                                |
//! |---------------------|--------------------------------------------------------|
//! | `id`                | `id`                                                   |
//! | `full_name`         | `fullName`, `full_name`, `name`, `customerName`        |
//! | `mobile_number`     | `mobileNumber`, `mobile_number`, `mobile`, `contactNumber` |
//! | `date`              | `date`, `bookingDate`, `booking_date`                  |
//! | `slots`             | `slots` (array, or a single object)                    |
//! | `created_at`        | `createdAt`, `created_at`                              |
//! | `payment_status`    | `paymentStatus`, `payment_status`, `status`            |
//! | `payment_screenshot`| `paymentScreenshot`, `payment_screenshot`              |
//! | `total_amount`      | `totalAmount`, `total_amount`, `amount`, `price`       |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::slot::{format_hour, parse_hour, price_for_hour, slot_id};
use crate::models::{Booking, PaymentStatus, Slot};

const FULL_NAME_KEYS: &[&str] = &["fullName", "full_name", "name", "customerName"];
const MOBILE_KEYS: &[&str] = &["mobileNumber", "mobile_number", "mobile", "contactNumber"];
const DATE_KEYS: &[&str] = &["date", "bookingDate", "booking_date"];
const CREATED_AT_KEYS: &[&str] = &["createdAt", "created_at"];
const STATUS_KEYS: &[&str] = &["paymentStatus", "payment_status", "status"];
const SCREENSHOT_KEYS: &[&str] = &["paymentScreenshot", "payment_screenshot"];
const AMOUNT_KEYS: &[&str] = &["totalAmount", "total_amount", "amount", "price"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalizeError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no {0}")]
    Missing(&'static str),
    #[error("record has an invalid {0}")]
    Invalid(&'static str),
}

pub fn booking_from_value(value: &Value) -> Result<Booking, NormalizeError> {
    if !value.is_object() {
        return Err(NormalizeError::NotAnObject);
    }

    let id = first_str(value, &["id"]).ok_or(NormalizeError::Missing("id"))?;
    let date_str = first_str(value, DATE_KEYS).ok_or(NormalizeError::Missing("date"))?;
    let date = parse_date(&date_str).ok_or(NormalizeError::Invalid("date"))?;

    let slots = match value.get("slots") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| slot_from_value(item, date))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![slot_from_value(single, date)?],
    };

    let created_at = first_str(value, CREATED_AT_KEYS)
        .and_then(|s| parse_timestamp(&s))
        .ok_or(NormalizeError::Missing("created_at"))?;

    let payment_status = first_str(value, STATUS_KEYS)
        .map(|s| PaymentStatus::parse(&s))
        .unwrap_or(PaymentStatus::Pending);

    let total_amount = first_i64(value, AMOUNT_KEYS)
        .unwrap_or_else(|| slots.iter().map(|s| s.price).sum());

    Ok(Booking {
        id,
        full_name: first_str(value, FULL_NAME_KEYS).unwrap_or_default(),
        mobile_number: first_str(value, MOBILE_KEYS).unwrap_or_default(),
        date,
        slots,
        created_at,
        payment_status,
        payment_screenshot: first_str(value, SCREENSHOT_KEYS).filter(|s| !s.is_empty()),
        total_amount,
    })
}

/// Slots stored before prices or dates were recorded get them re-derived.
fn slot_from_value(value: &Value, booking_date: NaiveDate) -> Result<Slot, NormalizeError> {
    let time = first_str(value, &["time"]).ok_or(NormalizeError::Missing("slot time"))?;
    let hour = parse_hour(&time).ok_or(NormalizeError::Invalid("slot time"))?;
    let time = format_hour(hour);

    let date = first_str(value, &["date"])
        .and_then(|s| parse_date(&s))
        .unwrap_or(booking_date);

    // Bare hour ids ("14") from the old grid are replaced by the natural key.
    let canonical = slot_id(date, &time);
    let id = first_str(value, &["id"])
        .filter(|id| id.starts_with(&date.format("%Y-%m-%d").to_string()))
        .unwrap_or(canonical);

    Ok(Slot {
        id,
        date,
        price: first_i64(value, &["price"]).unwrap_or_else(|| price_for_hour(hour)),
        time,
        is_available: true,
    })
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
