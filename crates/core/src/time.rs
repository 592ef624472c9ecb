//! Timestamp formats found in crash logs and the system log.
//!
//! Syslog lines carry `Mon DD HH:MM:SS` stamps without a year. The same
//! format string is used to render a crash date for matching and to parse
//! stamps back, so the two directions cannot drift apart.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// `strftime` pattern for syslog stamps (`Feb  3 12:34:56`).
pub const SYSLOG_TIME_FORMAT: &str = "%b %e %H:%M:%S";

/// Length in bytes of a rendered syslog stamp.
pub const SYSLOG_TIME_LEN: usize = 15;

const CRASH_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Render `date` as a syslog stamp.
pub fn format_syslog_time(date: &NaiveDateTime) -> String {
    date.format(SYSLOG_TIME_FORMAT).to_string()
}

/// Parse a syslog stamp, borrowing the year from `year`.
pub fn parse_syslog_time(stamp: &str, year: i32) -> Option<NaiveDateTime> {
    let with_year = format!("{year} {}", stamp.trim());
    NaiveDateTime::parse_from_str(&with_year, &format!("%Y {SYSLOG_TIME_FORMAT}")).ok()
}

/// Parse the leading syslog stamp of a log line, if it has one.
pub fn syslog_line_time(line: &str, year: i32) -> Option<NaiveDateTime> {
    let stamp = line.get(..SYSLOG_TIME_LEN)?;
    parse_syslog_time(stamp, year)
}

/// Parse the value of a crash log `Date/Time:` header.
///
/// Accepts the ISO-like form written by the OS (with or without fractional
/// seconds and UTC offset) and falls back to a syslog stamp in the current
/// year. Offsets are dropped: crash dates are compared against local syslog
/// stamps, which carry no offset either.
pub fn parse_crash_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in CRASH_DATE_FORMATS {
        if fmt.ends_with("%z") {
            if let Ok(dt) = chrono::DateTime::parse_from_str(value, fmt) {
                return Some(dt.naive_local());
            }
        } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    parse_syslog_time(value, chrono::Local::now().year())
}

/// Build a date from already-decoded calendar fields.
pub fn date_from_parts(
    year: i32,
    month: i32,
    day: i32,
    hour: i32,
    minute: i32,
    second: i32,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)?
        .and_hms_opt(
            u32::try_from(hour).ok()?,
            u32::try_from(minute).ok()?,
            u32::try_from(second).ok()?,
        )
}
