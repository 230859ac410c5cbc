//! Timestamp utilities
//!
//! Audit timestamps are stored in UTC as `YYYY-MM-DD HH:MM:SS` text, which
//! sorts lexically and is understood by SQLite's date functions. Display
//! formatting applies a configured UTC offset.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Storage format for audit timestamps
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const WEEKDAYS_FR: [&str; 7] = [
    "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
];

const MONTHS_FR: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for the `submitted_at` column
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Parse a `submitted_at` column value
pub fn from_storage(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, STORAGE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", s, e)))
}

/// Half-open storage bounds `[start 00:00:00, day after end 00:00:00)` covering whole days
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use kitcheck_common::time::day_range_bounds;
///
/// let (lo, hi) = day_range_bounds(
///     Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
///     Some(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
/// );
/// assert_eq!(lo.as_deref(), Some("2024-01-01 00:00:00"));
/// assert_eq!(hi.as_deref(), Some("2024-02-01 00:00:00"));
/// ```
pub fn day_range_bounds(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (Option<String>, Option<String>) {
    let lo = start.map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")));
    let hi = end
        .and_then(|d| d.succ_opt())
        .map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")));
    (lo, hi)
}

/// French long date, e.g. `lundi 15 janvier 2024 à 14h30`
///
/// `utc_offset_minutes` shifts the UTC timestamp into local wall-clock time.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use kitcheck_common::time::format_local_fr;
///
/// let ts = Utc.with_ymd_and_hms(2024, 1, 15, 13, 30, 0).unwrap();
/// assert_eq!(format_local_fr(&ts, 60), "lundi 15 janvier 2024 à 14h30");
/// ```
pub fn format_local_fr(ts: &DateTime<Utc>, utc_offset_minutes: i32) -> String {
    let local = local_naive(ts, utc_offset_minutes);

    format!(
        "{} {} {} {} à {:02}h{:02}",
        WEEKDAYS_FR[local.weekday().num_days_from_monday() as usize],
        local.day(),
        MONTHS_FR[local.month0() as usize],
        local.year(),
        local.hour(),
        local.minute()
    )
}

/// Short numeric local date, e.g. `15/01/2024 14:30`
pub fn format_local_short(ts: &DateTime<Utc>, utc_offset_minutes: i32) -> String {
    local_naive(ts, utc_offset_minutes)
        .format("%d/%m/%Y %H:%M")
        .to_string()
}

/// Wall-clock time at the offset; offsets chrono cannot represent show UTC
fn local_naive(ts: &DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDateTime {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .map(|offset| ts.with_timezone(&offset).naive_local())
        .unwrap_or_else(|| ts.naive_utc())
}
