use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const SLOTS_PER_DAY: u32 = 24;
pub const DAYTIME_PRICE: i64 = 500;
pub const PEAK_PRICE: i64 = 600;

/// Hours in `[DAYTIME_START, DAYTIME_END)` get the daytime rate.
const DAYTIME_START: u32 = 6;
const DAYTIME_END: u32 = 17;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    pub date: NaiveDate,
    pub time: String,
    pub price: i64,
    pub is_available: bool,
}

impl Slot {
    pub fn new(date: NaiveDate, hour: u32) -> Self {
        let time = format_hour(hour);
        Self {
            id: slot_id(date, &time),
            date,
            price: price_for_hour(hour),
            time,
            is_available: true,
        }
    }

    /// Hour of day parsed from `time` ("HH:00").
    pub fn hour(&self) -> Option<u32> {
        parse_hour(&self.time)
    }
}

pub fn price_for_hour(hour: u32) -> i64 {
    if (DAYTIME_START..DAYTIME_END).contains(&hour) {
        DAYTIME_PRICE
    } else {
        PEAK_PRICE
    }
}

pub fn slot_id(date: NaiveDate, time: &str) -> String {
    format!("{}-{time}", date.format("%Y-%m-%d"))
}

pub fn format_hour(hour: u32) -> String {
    format!("{hour:02}:00")
}

pub fn parse_hour(time: &str) -> Option<u32> {
    let (hour, minute) = time.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    (hour < SLOTS_PER_DAY && minute < 60).then_some(hour)
}

/// The canonical slot set for `date`, one per hour, all available.
pub fn generate_slots(date: NaiveDate) -> Vec<Slot> {
    (0..SLOTS_PER_DAY).map(|hour| Slot::new(date, hour)).collect()
}
