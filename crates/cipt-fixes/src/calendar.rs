use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

/// Fixed-date holidays as (day, month). Movable feasts are not observed.
const FIXED_HOLIDAYS: [(u32, u32); 10] = [
    (1, 1),
    (21, 4),
    (1, 5),
    (24, 6),
    (7, 9),
    (16, 9),
    (12, 10),
    (2, 11),
    (15, 11),
    (25, 12),
];

pub fn is_holiday(date: NaiveDate) -> bool {
    FIXED_HOLIDAYS.contains(&(date.day(), date.month()))
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// First business day on or after `from + offset_days`.
pub fn next_business_day(from: NaiveDate, offset_days: u64) -> NaiveDate {
    let mut date = from
        .checked_add_days(Days::new(offset_days))
        .unwrap_or(NaiveDate::MAX);
    while !is_business_day(date) {
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    date
}

/// Calendar date right now in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}
