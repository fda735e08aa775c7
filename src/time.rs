//! Conversion between local wall-clock times and UTC epoch seconds.
//!
//! Every timetable and realtime feed is recorded in UK local time, so all
//! conversions go through [`SOURCE_TZ`].

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{PipelineError, Result};

/// Time zone in which timetable and realtime feeds are recorded.
pub const SOURCE_TZ: Tz = chrono_tz::Europe::London;

/// Date format used in file names, UIDs and calendar tables.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Parses a `YYYYMMDD` date, also accepting ISO `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| PipelineError::InvalidDate(value.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Returns the hour component of an `[H]H:MM:SS` string without validating
/// the rest, or `None` when the hour is not a number.
pub fn hour_of(time_of_day: &str) -> Option<u32> {
    time_of_day.trim().split(':').next()?.parse().ok()
}

/// Parses `[H]H:MM:SS` into a wall-clock time. Hours of 24 and above are
/// rejected; GTFS next-day times must be filtered out before this call.
pub fn parse_time_of_day(time_of_day: &str) -> Result<NaiveTime> {
    let malformed = || PipelineError::MalformedTime(time_of_day.to_string());

    let mut parts = time_of_day.trim().split(':');
    let mut next = || -> Result<u32> {
        parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(malformed)
    };
    let (h, m, s) = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return Err(malformed());
    }

    NaiveTime::from_hms_opt(h, m, s).ok_or_else(malformed)
}

/// Resolves a local wall-clock datetime to UTC epoch seconds.
///
/// Folded (ambiguous) times take the earlier instant. Times that fall in the
/// spring-forward gap are read with the offset in force after the gap.
fn local_to_unix(local: NaiveDateTime) -> Result<i64> {
    let resolved = match SOURCE_TZ.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => SOURCE_TZ
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|dt| dt - Duration::hours(1)),
    };

    resolved
        .map(|dt| dt.timestamp())
        .ok_or_else(|| PipelineError::MalformedTime(local.to_string()))
}

/// Epoch seconds of local midnight on `date`.
pub fn local_midnight_to_unix(date: NaiveDate) -> Result<i64> {
    local_to_unix(date.and_time(NaiveTime::MIN))
}

/// Epoch seconds of a single `HH:MM:SS` wall-clock time on `date`.
pub fn local_time_to_unix(date: NaiveDate, time_of_day: &str) -> Result<i64> {
    let time = parse_time_of_day(time_of_day)?;
    local_to_unix(date.and_time(time))
}

/// Column form of [`local_time_to_unix`]. Fails on the first malformed value.
pub fn local_time_column_to_unix<S: AsRef<str>>(
    date: NaiveDate,
    times_of_day: &[S],
) -> Result<Vec<i64>> {
    times_of_day
        .iter()
        .map(|t| local_time_to_unix(date, t.as_ref()))
        .collect()
}

/// Converts epoch seconds to a local `HH:MM:SS` string, dropping the date.
pub fn unix_to_local_time_string(unix_seconds: i64) -> Result<String> {
    let utc = DateTime::from_timestamp(unix_seconds, 0)
        .ok_or_else(|| PipelineError::MalformedTime(unix_seconds.to_string()))?;
    Ok(utc.with_timezone(&SOURCE_TZ).format("%H:%M:%S").to_string())
}
