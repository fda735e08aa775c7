use std::fmt::Display;

use chrono::NaiveDate;
use serde::Serialize;

use crate::time::format_date;

/// Separator between the parts of a [`Uid`].
pub const UID_SEPARATOR: char = '_';

/// Composite key identifying one stop-visit: `{date}_{sequence}_{trip_id}_{route_id}`.
///
/// Timetable rows build it from `stop_sequence`, realtime pings from
/// `current_stop`; both sides must agree on the date format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Uid(String);

impl Uid {
    pub fn new(date: NaiveDate, sequence: u32, trip_id: &str, route_id: &str) -> Self {
        Self(format!(
            "{}{sep}{}{sep}{}{sep}{}",
            format_date(date),
            sequence,
            trip_id,
            route_id,
            sep = UID_SEPARATOR
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
