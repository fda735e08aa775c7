//! Output persistence: stop and geography tables, the unlabelled ping
//! export, and the run summary log.

use std::fs::{self, OpenOptions};
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzers::types::{GeographyPunctuality, StopPunctuality};
use crate::config::GeographyColumns;
use crate::error::Result;
use crate::loaders::realtime::VehiclePing;
use crate::stats::RunSummary;

const STOP_HEADER: [&str; 5] = [
    "stop_id",
    "stop_lat",
    "stop_lon",
    "service_stops",
    "punctuality_rate",
];

const PING_HEADER: [&str; 10] = [
    "time_ingest",
    "time_transpond",
    "bus_id",
    "trip_id",
    "route_id",
    "current_stop",
    "latitude",
    "longitude",
    "bearing",
    "journey_date",
];

/// Logs a run summary using Rust's debug pretty-print format.
pub fn print_pretty(summary: &RunSummary) {
    debug!("{:#?}", summary);
}

/// Logs a run summary as pretty-printed JSON.
pub fn print_json(summary: &RunSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Appends `record` as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    ensure_parent(path)?;
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Overwrites `path` with `header` followed by one row per record. The header
/// is written even when `rows` is empty.
pub fn write_table<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

pub fn write_stop_punctuality(path: &Path, rows: &[StopPunctuality]) -> Result<()> {
    write_table(path, &STOP_HEADER, rows)
}

/// Writes geography rows under the level's own code and name headers.
pub fn write_geography_punctuality(
    path: &Path,
    columns: &GeographyColumns,
    rows: &[GeographyPunctuality],
) -> Result<()> {
    let header = [
        columns.code.as_str(),
        columns.name.as_str(),
        "service_stops",
        "punctual_service_stops",
        "punctuality_rate",
    ];
    write_table(path, &header, rows)
}

pub fn write_unlabelled(path: &Path, pings: &[VehiclePing]) -> Result<()> {
    write_table(path, &PING_HEADER, pings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        let summary = RunSummary::default();
        print_pretty(&summary);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let summary = RunSummary::default();
        print_json(&summary).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("bus_metrics_test_create.csv");
        let _ = fs::remove_file(&path);

        append_record(&path, &RunSummary::default()).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("bus_metrics_test_header.csv");
        let _ = fs::remove_file(&path);

        let summary = RunSummary::new("north_east", "20231101");
        append_record(&path, &summary).unwrap();
        append_record(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_stop_punctuality_empty_keeps_header() {
        let path = temp_path("bus_metrics_test_empty_stops.csv");
        write_stop_punctuality(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "stop_id,stop_lat,stop_lon,service_stops,punctuality_rate"
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_geography_uses_level_headers() {
        let dir = temp_path("bus_metrics_test_geography");
        let path = dir.join("punctuality").join("lsoa.csv");
        let rows = vec![
            GeographyPunctuality {
                geography_code: "E01".to_string(),
                geography_name: "Area".to_string(),
                service_stops: 40,
                punctual_service_stops: 29,
                punctuality_rate: 0.725,
            },
            GeographyPunctuality {
                geography_code: "E02".to_string(),
                geography_name: "Empty".to_string(),
                service_stops: 0,
                punctual_service_stops: 0,
                punctuality_rate: f64::NAN,
            },
        ];

        write_geography_punctuality(&path, &GeographyColumns::new("LSOA21CD", "LSOA21NM"), &rows)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "LSOA21CD,LSOA21NM,service_stops,punctual_service_stops,punctuality_rate"
        );
        assert_eq!(lines[1], "E01,Area,40,29,0.725");
        assert_eq!(lines[2], "E02,Empty,0,0,NaN");

        fs::remove_dir_all(&dir).unwrap();
    }
}
