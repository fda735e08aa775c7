//! Realtime loader: one day's vehicle-position pings for a region.
//!
//! Ping files are written by the ingest job as `{region}_{date}*.csv`
//! (optionally gzipped), one row per ping, usually without a header:
//!
//! ```text
//! time_ingest,time_transpond,bus_id,trip_id,route_id,current_stop,latitude,longitude,bearing[,journey_date]
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::table::reader;
use crate::time::{format_date, parse_date};
use crate::uid::Uid;

const HEADER_MARKER: &str = "time_ingest";

/// Positional layout of a ping file row.
#[derive(Debug, Deserialize)]
struct RawPing {
    time_ingest: i64,
    time_transpond: i64,
    bus_id: String,
    trip_id: Option<String>,
    route_id: Option<String>,
    current_stop: Option<u32>,
    latitude: f64,
    longitude: f64,
    bearing: Option<f64>,
    #[serde(default)]
    journey_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehiclePing {
    pub time_ingest: i64,
    pub time_transpond: i64,
    pub bus_id: String,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub current_stop: Option<u32>,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: Option<f64>,
    pub journey_date: NaiveDate,
}

impl VehiclePing {
    /// A ping is labelled when it names both its trip and its route.
    pub fn is_labelled(&self) -> bool {
        self.trip_id.is_some() && self.route_id.is_some()
    }

    /// The stop-visit key, when the ping carries enough to build one.
    pub fn uid(&self) -> Option<Uid> {
        match (&self.trip_id, &self.route_id, self.current_stop) {
            (Some(trip_id), Some(route_id), Some(stop)) => {
                Some(Uid::new(self.journey_date, stop, trip_id, route_id))
            }
            _ => None,
        }
    }
}

/// A labelled ping together with its stop-visit key.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledPing {
    pub uid: Uid,
    pub ping: VehiclePing,
}

/// Loader output plus the counts of rows each step removed.
#[derive(Debug, Default)]
pub struct Realtime {
    pub labelled: Vec<LabelledPing>,
    pub unlabelled: Vec<VehiclePing>,
    pub raw_pings: usize,
    pub exact_duplicates: usize,
    /// Labelled pings with no `current_stop`, which cannot form a UID.
    pub missing_stop: usize,
    /// Earlier transmissions replaced by a later ping for the same UID.
    pub superseded: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Ping files in `dir` for `region` on `date`, sorted by name. Both
/// `{region}_20231101*` and `{region}_2023-11-01*` prefixes match.
pub fn ping_files(dir: &Path, region: &str, date: NaiveDate) -> Result<Vec<PathBuf>> {
    let prefixes = [
        format!("{}_{}", region, format_date(date)),
        format!("{}_{}", region, date.format("%Y-%m-%d")),
    ];

    let entries = fs::read_dir(dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::not_found(dir),
        _ => PipelineError::Io(e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_csv = name.ends_with(".csv") || name.ends_with(".csv.gz");
        if is_csv && prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PipelineError::not_found(
            dir.join(format!("{}*.csv", prefixes[0])),
        ));
    }
    files.sort();
    Ok(files)
}

/// Reads every ping in one file. `date` fills in a missing journey date.
pub fn read_pings(path: &Path, date: NaiveDate) -> Result<Vec<VehiclePing>> {
    let mut rdr = reader(path, false)?;
    let mut pings = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        if i == 0 && record.get(0) == Some(HEADER_MARKER) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let malformed = |message: String| PipelineError::MalformedRecord {
            path: path.to_path_buf(),
            line,
            message,
        };

        let raw: RawPing = record
            .deserialize(None)
            .map_err(|e| malformed(e.to_string()))?;
        let journey_date = match non_empty(raw.journey_date) {
            Some(d) => parse_date(&d).map_err(|e| malformed(e.to_string()))?,
            None => date,
        };

        pings.push(VehiclePing {
            time_ingest: raw.time_ingest,
            time_transpond: raw.time_transpond,
            bus_id: raw.bus_id,
            trip_id: non_empty(raw.trip_id),
            route_id: non_empty(raw.route_id),
            current_stop: raw.current_stop,
            latitude: raw.latitude,
            longitude: raw.longitude,
            bearing: raw.bearing,
            journey_date,
        });
    }

    debug!(path = %path.display(), pings = pings.len(), "Read ping file");
    Ok(pings)
}

/// Drops exact repeats of a transmission. Of each repeated group the ping
/// with the greatest `time_ingest` is kept, the later one in file order on ties.
pub fn drop_exact_duplicates(pings: Vec<VehiclePing>) -> Vec<VehiclePing> {
    let mut slots: HashMap<_, usize> = HashMap::new();
    let mut kept: Vec<VehiclePing> = Vec::with_capacity(pings.len());
    for ping in pings {
        let key = (
            ping.bus_id.clone(),
            ping.time_transpond,
            ping.latitude.to_bits(),
            ping.longitude.to_bits(),
            ping.bearing.map(f64::to_bits),
            ping.journey_date,
        );
        match slots.get(&key) {
            Some(&i) => {
                if ping.time_ingest >= kept[i].time_ingest {
                    kept[i] = ping;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(ping);
            }
        }
    }
    kept
}

/// Splits pings into labelled and unlabelled streams and reduces the
/// labelled stream to the latest ping per stop-visit.
pub fn label_pings(pings: Vec<VehiclePing>) -> Realtime {
    let raw_pings = pings.len();
    let pings = drop_exact_duplicates(pings);
    let exact_duplicates = raw_pings - pings.len();

    let (mut labelled, unlabelled): (Vec<_>, Vec<_>) =
        pings.into_iter().partition(VehiclePing::is_labelled);

    labelled.sort_by(|a, b| {
        (&a.trip_id, a.current_stop, a.time_transpond, a.time_ingest).cmp(&(
            &b.trip_id,
            b.current_stop,
            b.time_transpond,
            b.time_ingest,
        ))
    });

    let keyed: Vec<(Uid, VehiclePing)> = labelled
        .into_iter()
        .filter_map(|p| p.uid().map(|uid| (uid, p)))
        .collect();
    let labelled_count = raw_pings - exact_duplicates - unlabelled.len();
    let missing_stop = labelled_count - keyed.len();

    let last_index: HashMap<&Uid, usize> = keyed
        .iter()
        .enumerate()
        .map(|(i, (uid, _))| (uid, i))
        .collect();
    let keep: Vec<bool> = (0..keyed.len())
        .map(|i| last_index.get(&keyed[i].0) == Some(&i))
        .collect();

    let labelled: Vec<LabelledPing> = keyed
        .into_iter()
        .zip(keep)
        .filter_map(|((uid, ping), keep)| keep.then_some(LabelledPing { uid, ping }))
        .collect();
    let superseded = labelled_count - missing_stop - labelled.len();

    Realtime {
        labelled,
        unlabelled,
        raw_pings,
        exact_duplicates,
        missing_stop,
        superseded,
    }
}

/// Loads, deduplicates and labels every ping for `region` on `date`.
#[tracing::instrument(skip_all, fields(realtime_dir = %realtime_dir.display(), region = %region, date = %date))]
pub fn load_realtime(realtime_dir: &Path, region: &str, date: NaiveDate) -> Result<Realtime> {
    let files = ping_files(realtime_dir, region, date)?;
    debug!(files = files.len(), "Found ping files");

    let mut pings = Vec::new();
    for file in &files {
        pings.extend(read_pings(file, date)?);
    }

    let realtime = label_pings(pings);
    if realtime.missing_stop > 0 {
        warn!(
            missing_stop = realtime.missing_stop,
            "Labelled pings without current_stop were dropped"
        );
    }
    info!(
        raw = realtime.raw_pings,
        labelled = realtime.labelled.len(),
        unlabelled = realtime.unlabelled.len(),
        superseded = realtime.superseded,
        "Realtime loaded"
    );

    Ok(realtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, 1).unwrap()
    }

    fn ping(ingest: i64, transpond: i64, trip: Option<&str>, route: Option<&str>, stop: Option<u32>) -> VehiclePing {
        VehiclePing {
            time_ingest: ingest,
            time_transpond: transpond,
            bus_id: "BUS1".to_string(),
            trip_id: trip.map(str::to_string),
            route_id: route.map(str::to_string),
            current_stop: stop,
            latitude: 54.9,
            longitude: -1.6,
            bearing: Some(90.0),
            journey_date: date(),
        }
    }

    #[test]
    fn test_latest_ingest_wins() {
        let pings = vec![
            ping(200, 100, Some("T1"), Some("R1"), Some(3)),
            ping(150, 100, Some("T1"), Some("R1"), Some(3)),
        ];
        let rt = label_pings(pings);

        assert_eq!(rt.labelled.len(), 1);
        assert_eq!(rt.labelled[0].ping.time_ingest, 200);
        assert_eq!(rt.exact_duplicates, 1);
    }

    #[test]
    fn test_latest_ingest_wins_for_same_visit_at_other_position() {
        let mut moved = ping(150, 100, Some("T1"), Some("R1"), Some(3));
        moved.latitude = 54.95;
        let pings = vec![ping(200, 100, Some("T1"), Some("R1"), Some(3)), moved];
        let rt = label_pings(pings);

        assert_eq!(rt.exact_duplicates, 0);
        assert_eq!(rt.labelled.len(), 1);
        assert_eq!(rt.labelled[0].ping.time_ingest, 200);
        assert_eq!(rt.superseded, 1);
    }

    #[test]
    fn test_exact_duplicate_keeps_greatest_ingest() {
        let kept = drop_exact_duplicates(vec![
            ping(300, 100, None, None, None),
            ping(250, 100, None, None, None),
            ping(50, 40, None, None, None),
        ]);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].time_ingest, 300);
        assert_eq!(kept[1].time_ingest, 50);
    }

    #[test]
    fn test_latest_transpond_wins_over_ingest() {
        let pings = vec![
            ping(900, 110, Some("T1"), Some("R1"), Some(3)),
            ping(100, 120, Some("T1"), Some("R1"), Some(3)),
        ];
        let rt = label_pings(pings);

        assert_eq!(rt.labelled.len(), 1);
        assert_eq!(rt.labelled[0].ping.time_transpond, 120);
    }

    #[test]
    fn test_partition_labelled_and_unlabelled() {
        let pings = vec![
            ping(1, 1, Some("T1"), Some("R1"), Some(1)),
            ping(2, 2, Some("T1"), None, Some(2)),
            ping(3, 3, None, Some("R1"), Some(3)),
            ping(4, 4, None, None, None),
        ];
        let rt = label_pings(pings);

        assert_eq!(rt.labelled.len(), 1);
        assert_eq!(rt.unlabelled.len(), 3);
        assert_eq!(rt.labelled[0].uid.as_str(), "20231101_1_T1_R1");
    }

    #[test]
    fn test_labelled_without_stop_is_counted() {
        let pings = vec![
            ping(1, 1, Some("T1"), Some("R1"), None),
            ping(2, 2, Some("T1"), Some("R1"), Some(4)),
        ];
        let rt = label_pings(pings);

        assert_eq!(rt.labelled.len(), 1);
        assert_eq!(rt.missing_stop, 1);
        assert_eq!(rt.superseded, 0);
    }

    #[test]
    fn test_exact_duplicates_removed() {
        let mut repeat = ping(5, 1, None, None, None);
        let first = ping(1, 1, None, None, None);
        repeat.bus_id = first.bus_id.clone();
        let rt = label_pings(vec![first, repeat]);

        assert_eq!(rt.exact_duplicates, 1);
        assert_eq!(rt.unlabelled.len(), 1);
        assert_eq!(rt.unlabelled[0].time_ingest, 5);
    }

    #[test]
    fn test_labelled_is_sorted_by_trip_and_stop() {
        let pings = vec![
            ping(1, 1, Some("T2"), Some("R1"), Some(1)),
            ping(2, 2, Some("T1"), Some("R1"), Some(2)),
            ping(3, 3, Some("T1"), Some("R1"), Some(1)),
        ];
        let rt = label_pings(pings);

        let uids: Vec<&str> = rt.labelled.iter().map(|l| l.uid.as_str()).collect();
        assert_eq!(
            uids,
            vec!["20231101_1_T1_R1", "20231101_2_T1_R1", "20231101_1_T2_R1"]
        );
    }

    #[test]
    fn test_read_headerless_and_headed_files() {
        let dir = env::temp_dir().join("bus_metrics_rt_read");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("north_east_20231101_0800.csv"),
            "1698825600,1698825590,B1,T1,R1,3,54.9,-1.6,90\n\
             1698825660,1698825650,B2,,,0,54.8,-1.5,\n",
        )
        .unwrap();
        fs::write(
            dir.join("north_east_20231101_0900.csv"),
            "time_ingest,time_transpond,bus_id,trip_id,route_id,current_stop,latitude,longitude,bearing,journey_date\n\
             1698829200,1698829190,B1,T1,R1,4,54.9,-1.6,90,20231101\n",
        )
        .unwrap();
        fs::write(dir.join("north_east_20231102_0800.csv"), "").unwrap();
        fs::write(dir.join("yorkshire_20231101_0800.csv"), "").unwrap();

        let rt = load_realtime(&dir, "north_east", date()).unwrap();
        assert_eq!(rt.raw_pings, 3);
        assert_eq!(rt.labelled.len(), 2);
        assert_eq!(rt.unlabelled.len(), 1);
        assert_eq!(rt.unlabelled[0].bearing, None);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = env::temp_dir().join("bus_metrics_rt_malformed");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("north_east_20231101.csv"),
            "1698825600,1698825590,B1,T1,R1,3,54.9,-1.6,90\n\
             not_a_time,1698825590,B1,T1,R1,3,54.9,-1.6,90\n",
        )
        .unwrap();

        match load_realtime(&dir, "north_east", date()) {
            Err(PipelineError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed record, got {:?}", other),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_no_ping_files() {
        let dir = env::temp_dir().join("bus_metrics_rt_empty");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let result = load_realtime(&dir, "north_east", date());
        assert!(matches!(result, Err(PipelineError::InputNotFound { .. })));

        fs::remove_dir_all(&dir).unwrap();
    }
}
