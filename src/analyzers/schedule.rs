//! Reconciles realtime pings against the timetable and scores each stop.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::analyzers::types::{ScheduleRecord, StopPunctuality};
use crate::analyzers::utility::mean;
use crate::loaders::realtime::LabelledPing;
use crate::loaders::timetable::ServiceStop;
use crate::uid::Uid;

/// Exclusive lower bound on `relative_punctuality` for a punctual visit.
pub const LOWER_LIMIT_SECS: i64 = -300;
/// Exclusive upper bound on `relative_punctuality` for a punctual visit.
pub const UPPER_LIMIT_SECS: i64 = 60;

/// Punctual means strictly inside `(LOWER_LIMIT_SECS, UPPER_LIMIT_SECS)`.
pub fn is_punctual(relative_punctuality: i64) -> bool {
    relative_punctuality > LOWER_LIMIT_SECS && relative_punctuality < UPPER_LIMIT_SECS
}

/// Inner join of labelled pings and service stops on UID.
///
/// `relative_punctuality` is `scheduled_arrival_unix - time_transpond`, so a
/// positive value means the bus was early.
#[tracing::instrument(skip_all, fields(pings = realtime.len(), service_stops = timetable.len()))]
pub fn reconcile(realtime: &[LabelledPing], timetable: &[ServiceStop]) -> Vec<ScheduleRecord> {
    let by_uid: HashMap<&Uid, &ServiceStop> = timetable.iter().map(|s| (&s.uid, s)).collect();

    let records: Vec<ScheduleRecord> = realtime
        .iter()
        .filter_map(|labelled| {
            let service_stop = by_uid.get(&labelled.uid)?;
            let relative = service_stop.scheduled_arrival_unix - labelled.ping.time_transpond;
            Some(ScheduleRecord {
                service_stop: (*service_stop).clone(),
                bus_id: labelled.ping.bus_id.clone(),
                time_transpond: labelled.ping.time_transpond,
                relative_punctuality: relative,
                punctual: is_punctual(relative),
            })
        })
        .collect();

    info!(matched = records.len(), "Reconciled pings with timetable");
    records
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct StopKey {
    stop_id: String,
    lat_bits: Option<u64>,
    lon_bits: Option<u64>,
}

/// Groups matched records by `(stop_id, stop_lat, stop_lon)`, ordered by stop id.
pub fn punctuality_by_stop(records: &[ScheduleRecord]) -> Vec<StopPunctuality> {
    let mut groups: BTreeMap<StopKey, (Option<f64>, Option<f64>, Vec<f64>)> = BTreeMap::new();

    for record in records {
        let stop = &record.service_stop;
        let key = StopKey {
            stop_id: stop.stop_id.clone(),
            lat_bits: stop.stop_lat.map(f64::to_bits),
            lon_bits: stop.stop_lon.map(f64::to_bits),
        };
        groups
            .entry(key)
            .or_insert_with(|| (stop.stop_lat, stop.stop_lon, Vec::new()))
            .2
            .push(if record.punctual { 1.0 } else { 0.0 });
    }

    let stops: Vec<StopPunctuality> = groups
        .into_iter()
        .map(|(key, (stop_lat, stop_lon, outcomes))| StopPunctuality {
            stop_id: key.stop_id,
            stop_lat,
            stop_lon,
            service_stops: outcomes.len() as u64,
            punctuality_rate: mean(&outcomes),
        })
        .collect();

    debug!(stops = stops.len(), "Aggregated punctuality by stop");
    stops
}
