use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::loaders::realtime::Realtime;
use crate::loaders::timetable::Timetable;

/// Row counts for one schedule run, appended to the run summary file.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub date: String,
    pub registry_stops: usize,

    // timetable
    pub service_stops: usize,
    pub dropped_join: usize,
    pub excluded_route_type: usize,
    pub dropped_untimed: usize,
    pub duplicate_uids: usize,
    pub outside_window: usize,

    // realtime
    pub raw_pings: usize,
    pub exact_duplicates: usize,
    pub labelled_pings: usize,
    pub unlabelled_pings: usize,
    pub missing_stop: usize,
    pub superseded: usize,

    // reconciliation
    pub matched: usize,
    pub punctual: usize,
    pub stops_scored: usize,
}

impl RunSummary {
    pub fn new(region: &str, date: &str) -> Self {
        RunSummary {
            timestamp: Utc::now(),
            region: region.to_string(),
            date: date.to_string(),
            ..Default::default()
        }
    }

    pub fn with_timetable(mut self, timetable: &Timetable) -> Self {
        self.service_stops = timetable.service_stops.len();
        self.dropped_join = timetable.dropped_join;
        self.excluded_route_type = timetable.excluded_route_type;
        self.dropped_untimed = timetable.dropped_untimed;
        self.duplicate_uids = timetable.duplicate_uids;
        self.outside_window = timetable.outside_window;
        self
    }

    pub fn with_realtime(mut self, realtime: &Realtime) -> Self {
        self.raw_pings = realtime.raw_pings;
        self.exact_duplicates = realtime.exact_duplicates;
        self.labelled_pings = realtime.labelled.len();
        self.unlabelled_pings = realtime.unlabelled.len();
        self.missing_stop = realtime.missing_stop;
        self.superseded = realtime.superseded;
        self
    }

    /// Share of timetabled stop-visits observed in realtime, as a percentage.
    pub fn match_pct(&self) -> f64 {
        Self::pct(self.matched, self.service_stops)
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunSummary::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(RunSummary::pct(50, 100), 50.0);
        assert_eq!(RunSummary::pct(1, 4), 25.0);
    }

    #[test]
    fn test_with_timetable_copies_counts() {
        let timetable = Timetable {
            dropped_join: 3,
            outside_window: 7,
            ..Default::default()
        };
        let summary = RunSummary::new("north_east", "20231101").with_timetable(&timetable);

        assert_eq!(summary.region, "north_east");
        assert_eq!(summary.service_stops, 0);
        assert_eq!(summary.dropped_join, 3);
        assert_eq!(summary.outside_window, 7);
    }

    #[test]
    fn test_match_pct() {
        let summary = RunSummary {
            service_stops: 200,
            matched: 50,
            ..Default::default()
        };
        assert_eq!(summary.match_pct(), 25.0);
    }
}
