//! Date arithmetic relative to a term's first day.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where a date falls within a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPosition {
    pub date: NaiveDate,
    pub first_day: NaiveDate,
    /// 1-based term week. Not capped at the nominal term length.
    pub week: u32,
    /// 1 = Monday ... 7 = Sunday.
    pub weekday: u8,
    pub weekday_name: String,
}

/// Compute the term week and weekday of `target`.
///
/// Week `n` covers days `7(n-1)..7n` after `first_day`; the weekday comes
/// from the calendar, not from the offset.
pub fn week_position(
    first_day: NaiveDate,
    target: NaiveDate,
) -> Result<WeekPosition, ValidationError> {
    let days = target.signed_duration_since(first_day).num_days();
    if days < 0 {
        return Err(ValidationError::DateBeforeTermStart {
            date: target.to_string(),
            first_day: first_day.to_string(),
        });
    }

    let weekday = target.weekday();
    Ok(WeekPosition {
        date: target,
        first_day,
        week: (days / 7 + 1) as u32,
        weekday: weekday.number_from_monday() as u8,
        weekday_name: weekday_name(weekday).to_string(),
    })
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(text: &str) -> Result<NaiveDate, ValidationError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(text.to_string()))
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
