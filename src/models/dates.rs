use chrono::{Days, NaiveDate};

/// `days` consecutive dates starting at `today`.
pub fn available_dates(today: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (0..days as u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .collect()
}

pub fn is_within_window(date: NaiveDate, today: NaiveDate, days: usize) -> bool {
    let Some(last) = today.checked_add_days(Days::new(days.saturating_sub(1) as u64)) else {
        return date >= today;
    };
    days > 0 && date >= today && date <= last
}
