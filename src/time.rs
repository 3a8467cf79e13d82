//! Time coordinates
//!
//! Time axes carry OLE automation dates: fractional days since
//! 1899-12-30 00:00. Header timestamps are parsed with chrono and converted
//! once at header parse.

use crate::errors::{MeteoError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a timestamp to fractional days since 1899-12-30.
pub fn to_oadate(t: NaiveDateTime) -> f64 {
    let delta = t - epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

/// Inverse of [`to_oadate`], rounded to the millisecond.
pub fn from_oadate(days: f64) -> NaiveDateTime {
    epoch() + Duration::milliseconds((days * 86_400_000.0).round() as i64)
}

/// Build a timestamp from calendar parts, failing with a format error.
pub fn datetime(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            MeteoError::format(format!(
                "invalid timestamp {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}"
            ))
        })
}

/// Expand a two-digit year: below 50 is 20xx, below 100 is 19xx.
pub fn expand_two_digit_year(year: i32) -> i32 {
    match year {
        y if y < 50 => 2000 + y,
        y if y < 100 => 1900 + y,
        y => y,
    }
}

/// Parse MM5-style `yyyy-MM-dd_HH:mm:ss` dates; trailing fractional
/// seconds or padding are ignored.
pub fn parse_model_date(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    let head = text.get(..19).unwrap_or(text);
    NaiveDateTime::parse_from_str(head, "%Y-%m-%d_%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            let hours = text.get(..13).unwrap_or(text);
            NaiveDateTime::parse_from_str(&format!("{hours}:00:00"), "%Y-%m-%d_%H:%M:%S")
        })
        .map_err(|e| MeteoError::format(format!("invalid model date '{text}': {e}")))
}
