//! Timetable loader: one day's scheduled service stops from a GTFS directory.
//!
//! Services are selected from `calendar.txt` by weekday, adjusted by the
//! `calendar_dates.txt` exceptions for the target date, and expanded to one
//! [`ServiceStop`] per `stop_times.txt` row.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::loaders::stops::StopRegistry;
use crate::table::read_table;
use crate::time::{format_date, hour_of, local_midnight_to_unix, local_time_to_unix};
use crate::uid::Uid;

/// Buffer added either side of a requested time window, in seconds.
pub const WINDOW_BUFFER_SECS: i64 = 1800;

/// GTFS `route_type`. Extended codes outside the basic set are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
    Other(u16),
}

impl From<u16> for RouteType {
    fn from(code: u16) -> Self {
        match code {
            0 => RouteType::Tram,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableTram,
            6 => RouteType::AerialLift,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            other => RouteType::Other(other),
        }
    }
}

impl From<RouteType> for u16 {
    fn from(route_type: RouteType) -> Self {
        match route_type {
            RouteType::Tram => 0,
            RouteType::Subway => 1,
            RouteType::Rail => 2,
            RouteType::Bus => 3,
            RouteType::Ferry => 4,
            RouteType::CableTram => 5,
            RouteType::AerialLift => 6,
            RouteType::Funicular => 7,
            RouteType::Trolleybus => 11,
            RouteType::Monorail => 12,
            RouteType::Other(code) => code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
}

impl CalendarRow {
    fn runs_on(&self, weekday: Weekday) -> bool {
        let flag = match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        };
        flag == 1
    }
}

#[derive(Debug, Deserialize)]
struct CalendarDateRow {
    service_id: String,
    date: String,
    exception_type: u8,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    route_type: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    service_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    arrival_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

/// One scheduled stop-visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStop {
    pub uid: Uid,
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: String,
    pub timetable_date: NaiveDate,
    pub route_type: RouteType,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub scheduled_arrival_unix: i64,
}

#[derive(Debug, Clone)]
pub struct TimetableOptions {
    pub route_types: Vec<RouteType>,
    /// `(from, to)` in hours of day; `None` loads the whole day.
    pub time_window: Option<(f64, f64)>,
}

/// Loader output plus the counts of rows each filter removed.
#[derive(Debug, Default)]
pub struct Timetable {
    pub service_stops: Vec<ServiceStop>,
    /// Rows whose route could not be joined (missing route_id or route_type).
    pub dropped_join: usize,
    pub excluded_route_type: usize,
    /// Rows at or past 24:00:00, or with no arrival time at all.
    pub dropped_untimed: usize,
    pub duplicate_uids: usize,
    pub outside_window: usize,
}

/// Service ids running on `date`: weekday services plus added exceptions,
/// minus removed exceptions.
fn active_services(
    calendar: &[CalendarRow],
    calendar_dates: &[CalendarDateRow],
    date: NaiveDate,
) -> HashSet<String> {
    let date_str = format_date(date);
    let todays = calendar_dates.iter().filter(|cd| cd.date == date_str);

    let mut added = HashSet::new();
    let mut dropped = HashSet::new();
    for cd in todays {
        match cd.exception_type {
            1 => {
                added.insert(cd.service_id.as_str());
            }
            2 => {
                dropped.insert(cd.service_id.as_str());
            }
            other => debug!(service_id = %cd.service_id, other, "Unknown exception_type"),
        }
    }

    let weekday = date.weekday();
    calendar
        .iter()
        .filter(|c| c.runs_on(weekday))
        .map(|c| c.service_id.as_str())
        .chain(added)
        .filter(|s| !dropped.contains(s))
        .map(str::to_string)
        .collect()
}

/// Unix bounds of an hour-of-day window on `date`, widened by [`WINDOW_BUFFER_SECS`].
pub fn window_bounds(date: NaiveDate, from_hours: f64, to_hours: f64) -> Result<(i64, i64)> {
    let midnight = local_midnight_to_unix(date)?;
    let start = midnight + (from_hours * 3600.0) as i64 - WINDOW_BUFFER_SECS;
    let end = midnight + (to_hours * 3600.0) as i64 + WINDOW_BUFFER_SECS;
    Ok((start, end))
}

/// Loads the scheduled service stops in `gtfs_dir` for `date`.
#[tracing::instrument(skip_all, fields(gtfs_dir = %gtfs_dir.display(), date = %date))]
pub fn load_timetable(
    gtfs_dir: &Path,
    stops: &StopRegistry,
    date: NaiveDate,
    options: &TimetableOptions,
) -> Result<Timetable> {
    let calendar_dates: Vec<CalendarDateRow> = read_table(
        &gtfs_dir.join("calendar_dates.txt"),
        &["service_id", "date", "exception_type"],
    )?;
    let calendar: Vec<CalendarRow> = read_table(
        &gtfs_dir.join("calendar.txt"),
        &[
            "service_id",
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
        ],
    )?;
    let routes: Vec<RouteRow> =
        read_table(&gtfs_dir.join("routes.txt"), &["route_id", "route_type"])?;
    let trips: Vec<TripRow> = read_table(
        &gtfs_dir.join("trips.txt"),
        &["route_id", "service_id", "trip_id"],
    )?;
    let stop_times: Vec<StopTimeRow> = read_table(
        &gtfs_dir.join("stop_times.txt"),
        &["trip_id", "arrival_time", "stop_id", "stop_sequence"],
    )?;

    let active = active_services(&calendar, &calendar_dates, date);
    debug!(active_services = active.len(), "Resolved active services");

    let known_routes: HashMap<&str, Option<RouteType>> = routes
        .iter()
        .map(|r| (r.route_id.as_str(), r.route_type.map(RouteType::from)))
        .collect();

    let active_trips: HashMap<&str, &TripRow> = trips
        .iter()
        .filter(|t| active.contains(&t.service_id))
        .map(|t| (t.trip_id.as_str(), t))
        .collect();

    let window = match options.time_window {
        Some((from, to)) => Some(window_bounds(date, from, to)?),
        None => None,
    };

    let mut timetable = Timetable::default();
    let mut seen = HashSet::new();

    for st in stop_times {
        let Some(trip) = active_trips.get(st.trip_id.as_str()) else {
            continue;
        };

        let route_type = match known_routes.get(trip.route_id.as_str()) {
            Some(Some(rt)) if !trip.route_id.is_empty() => *rt,
            _ => {
                timetable.dropped_join += 1;
                continue;
            }
        };
        if !options.route_types.contains(&route_type) {
            timetable.excluded_route_type += 1;
            continue;
        }

        let arrival_time = match st.arrival_time {
            Some(t) if !t.is_empty() && hour_of(&t).is_none_or(|h| h < 24) => t,
            _ => {
                timetable.dropped_untimed += 1;
                continue;
            }
        };
        let scheduled_arrival_unix = local_time_to_unix(date, &arrival_time)?;

        let uid = Uid::new(date, st.stop_sequence, &st.trip_id, &trip.route_id);
        if !seen.insert(uid.clone()) {
            timetable.duplicate_uids += 1;
            continue;
        }

        if let Some((start, end)) = window {
            if scheduled_arrival_unix < start || scheduled_arrival_unix > end {
                timetable.outside_window += 1;
                continue;
            }
        }

        let stop = stops.get(&st.stop_id);
        timetable.service_stops.push(ServiceStop {
            uid,
            route_id: trip.route_id.clone(),
            service_id: trip.service_id.clone(),
            trip_id: st.trip_id,
            stop_id: st.stop_id,
            stop_sequence: st.stop_sequence,
            arrival_time,
            timetable_date: date,
            route_type,
            stop_lat: stop.map(|s| s.stop_lat),
            stop_lon: stop.map(|s| s.stop_lon),
            scheduled_arrival_unix,
        });
    }

    if timetable.dropped_join > 0 {
        warn!(
            dropped = timetable.dropped_join,
            "Dropped service stops with no route_id or route_type after join"
        );
    }
    if timetable.duplicate_uids > 0 {
        warn!(
            duplicates = timetable.duplicate_uids,
            "Timetable contains duplicate stop-visits"
        );
    }
    debug!(
        excluded_route_type = timetable.excluded_route_type,
        dropped_untimed = timetable.dropped_untimed,
        outside_window = timetable.outside_window,
        "Timetable filters applied"
    );
    info!(
        service_stops = timetable.service_stops.len(),
        "Timetable loaded"
    );

    Ok(timetable)
}
