//! Re-aggregates stop punctuality to a chosen geography level.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::analyzers::types::{GeographyPunctuality, LabelledStop, StopPunctuality};
use crate::analyzers::utility::{punctual_count, ratio};
use crate::error::Result;
use crate::loaders::lookup::{LookupTable, stop_key};
use crate::table::read_table;

const STOP_PUNCTUALITY_COLUMNS: [&str; 5] = [
    "stop_id",
    "stop_lat",
    "stop_lon",
    "service_stops",
    "punctuality_rate",
];

/// Reads a stop-level punctuality file written by the schedule stage.
pub fn load_stop_punctuality(path: &Path) -> Result<Vec<StopPunctuality>> {
    read_table(path, &STOP_PUNCTUALITY_COLUMNS)
}

/// Left join of stops onto the lookup on `(stop_id, stop_lat, stop_lon)`.
/// Unmatched stops keep empty geography columns.
pub fn label_stops(stops: &[StopPunctuality], lookup: &LookupTable) -> Vec<LabelledStop> {
    let mut labelled = Vec::with_capacity(stops.len());
    for stop in stops {
        let key = stop_key(&stop.stop_id, stop.stop_lat, stop.stop_lon);
        let mut matched = false;
        for row in lookup.matches(&key) {
            matched = true;
            labelled.push(LabelledStop {
                stop: stop.clone(),
                geography_code: row.geography_code.clone(),
                geography_name: row.geography_name.clone(),
            });
        }
        if !matched {
            labelled.push(LabelledStop {
                stop: stop.clone(),
                geography_code: None,
                geography_name: None,
            });
        }
    }
    labelled
}

/// Outcome of a geography aggregation.
#[derive(Debug, Default)]
pub struct GeographyReport {
    pub rows: Vec<GeographyPunctuality>,
    /// Stops excluded because the lookup gave them no code or name.
    pub unmatched_stops: usize,
}

/// Sums counts per `(code, name)`; rows lacking either are excluded.
pub fn aggregate_labelled(labelled: &[LabelledStop]) -> GeographyReport {
    let mut groups: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();
    let mut unmatched_stops = 0;

    for row in labelled {
        let (Some(code), Some(name)) = (&row.geography_code, &row.geography_name) else {
            unmatched_stops += 1;
            continue;
        };
        let totals = groups.entry((code.clone(), name.clone())).or_default();
        totals.0 += row.stop.service_stops;
        totals.1 += punctual_count(row.stop.service_stops, row.stop.punctuality_rate);
    }

    let rows = groups
        .into_iter()
        .map(|((code, name), (service, punctual))| GeographyPunctuality {
            geography_code: code,
            geography_name: name,
            service_stops: service,
            punctual_service_stops: punctual,
            punctuality_rate: ratio(punctual, service),
        })
        .collect();

    GeographyReport {
        rows,
        unmatched_stops,
    }
}

/// Adds a zero row for every lookup unit with no stops, keeping the code order.
pub fn fill_coverage(report: &mut GeographyReport, lookup: &LookupTable) {
    let mut added = 0;
    for (code, name) in lookup.units() {
        let present = report
            .rows
            .iter()
            .any(|r| r.geography_code == code && r.geography_name == name);
        if !present {
            report.rows.push(GeographyPunctuality {
                geography_code: code,
                geography_name: name,
                service_stops: 0,
                punctual_service_stops: 0,
                punctuality_rate: f64::NAN,
            });
            added += 1;
        }
    }
    report.rows.sort_by(|a, b| {
        (&a.geography_code, &a.geography_name).cmp(&(&b.geography_code, &b.geography_name))
    });
    info!(added, "Filled geography coverage");
}

/// Joins stops onto `lookup` and re-aggregates them.
pub fn aggregate_by_geography(
    stops: &[StopPunctuality],
    lookup: &LookupTable,
    full_coverage: bool,
) -> GeographyReport {
    let labelled = label_stops(stops, lookup);
    let mut report = aggregate_labelled(&labelled);

    if report.unmatched_stops > 0 {
        warn!(
            unmatched = report.unmatched_stops,
            "Stops without a geography in the lookup were excluded"
        );
    }
    let empty = report.rows.iter().filter(|r| r.service_stops == 0).count();
    if empty > 0 {
        warn!(empty, "Geography units with zero service stops have a NaN rate");
    }

    if full_coverage {
        fill_coverage(&mut report, lookup);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeographyColumns;
    use crate::error::PipelineError;
    use crate::loaders::lookup::{LookupRow, load_lookup};
    use std::env;
    use std::fs;

    fn stop(id: &str, service_stops: u64, rate: f64) -> StopPunctuality {
        StopPunctuality {
            stop_id: id.to_string(),
            stop_lat: Some(54.0),
            stop_lon: Some(-1.0),
            service_stops,
            punctuality_rate: rate,
        }
    }

    fn labelled(id: &str, service_stops: u64, rate: f64, code: &str, name: &str) -> LabelledStop {
        LabelledStop {
            stop: stop(id, service_stops, rate),
            geography_code: Some(code.to_string()),
            geography_name: Some(name.to_string()),
        }
    }

    fn lookup_row(id: &str, code: &str, name: &str) -> LookupRow {
        LookupRow {
            stop_id: id.to_string(),
            stop_lat: Some(54.0),
            stop_lon: Some(-1.0),
            geography_code: Some(code.to_string()),
            geography_name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_reaggregation_scenario() {
        let rows = vec![
            labelled("1", 10, 0.8, "1", "A"),
            labelled("2", 20, 0.9, "2", "B"),
            labelled("3", 30, 0.7, "1", "A"),
        ];

        let report = aggregate_labelled(&rows);

        assert_eq!(
            report.rows,
            vec![
                GeographyPunctuality {
                    geography_code: "1".to_string(),
                    geography_name: "A".to_string(),
                    service_stops: 40,
                    punctual_service_stops: 29,
                    punctuality_rate: 0.725,
                },
                GeographyPunctuality {
                    geography_code: "2".to_string(),
                    geography_name: "B".to_string(),
                    service_stops: 20,
                    punctual_service_stops: 18,
                    punctuality_rate: 0.9,
                },
            ]
        );
    }

    #[test]
    fn test_unmatched_stops_are_excluded() {
        let lookup: LookupTable = vec![lookup_row("1", "E01", "Area")].into_iter().collect();
        let stops = vec![stop("1", 10, 0.5), stop("9", 5, 1.0)];

        let report = aggregate_by_geography(&stops, &lookup, false);

        assert_eq!(report.unmatched_stops, 1);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].service_stops, 10);
        assert_eq!(report.rows[0].punctual_service_stops, 5);
    }

    #[test]
    fn test_zero_service_stops_gives_nan() {
        let report = aggregate_labelled(&[labelled("1", 0, f64::NAN, "E01", "Area")]);
        assert_eq!(report.rows.len(), 1);
        assert!(report.rows[0].punctuality_rate.is_nan());
    }

    #[test]
    fn test_full_coverage_adds_empty_units() {
        let lookup: LookupTable = vec![lookup_row("1", "E02", "B"), lookup_row("2", "E01", "A")]
            .into_iter()
            .collect();

        let report = aggregate_by_geography(&[stop("1", 4, 0.5)], &lookup, true);

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].geography_code, "E01");
        assert_eq!(report.rows[0].service_stops, 0);
        assert!(report.rows[0].punctuality_rate.is_nan());
        assert_eq!(report.rows[1].punctual_service_stops, 2);
    }

    #[test]
    fn test_duplicate_lookup_rows_multiply() {
        let lookup: LookupTable = vec![lookup_row("1", "E01", "A"), lookup_row("1", "E01", "A")]
            .into_iter()
            .collect();

        let report = aggregate_by_geography(&[stop("1", 10, 1.0)], &lookup, false);
        assert_eq!(report.rows[0].service_stops, 20);
    }

    #[test]
    fn test_missing_lookup_is_not_found() {
        let result = load_lookup(
            Path::new("missing/geography_lookup_table.csv"),
            &GeographyColumns::new("LSOA21CD", "LSOA21NM"),
        );
        assert!(matches!(result, Err(PipelineError::InputNotFound { .. })));
    }

    #[test]
    fn test_load_stop_punctuality_reads_empty_coordinates() {
        let path = env::temp_dir().join("bus_metrics_stop_punctuality_read.csv");
        fs::write(
            &path,
            "stop_id,stop_lat,stop_lon,service_stops,punctuality_rate\n\
             A,54.9,-1.6,4,0.75\n\
             B,,,2,0.5\n",
        )
        .unwrap();

        let stops = load_stop_punctuality(&path).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].punctuality_rate, 0.75);
        assert_eq!(stops[1].stop_lat, None);

        fs::remove_file(&path).unwrap();
    }
}
