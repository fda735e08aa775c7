use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::analyzers::geography::{GeographyReport, aggregate_by_geography, load_stop_punctuality};
use crate::analyzers::schedule::{punctuality_by_stop, reconcile};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::loaders::lookup::load_lookup;
use crate::loaders::realtime::load_realtime;
use crate::loaders::stops::{StopRegistry, load_stops};
use crate::loaders::timetable::{TimetableOptions, load_timetable};
use crate::output::{
    append_record, print_json, write_geography_punctuality, write_stop_punctuality,
    write_unlabelled,
};
use crate::stats::RunSummary;
use crate::time::format_date;

/// GTFS directory for the run: `{timetable_dir}/{region}_{date}` when it
/// exists, otherwise `timetable_dir` itself.
pub fn gtfs_dir(config: &PipelineConfig) -> PathBuf {
    let dated = config
        .timetable_dir
        .join(format!("{}_{}", config.region, config.date_stamp()));
    if dated.is_dir() {
        dated
    } else {
        config.timetable_dir.clone()
    }
}

/// Builds stop-level punctuality for the configured region and date, writes
/// it (plus the optional unlabelled export) and appends the run summary.
#[tracing::instrument(skip_all, fields(region = %config.region, date = %config.date))]
pub fn analyze(config: &PipelineConfig) -> Result<RunSummary> {
    let date = config.target_date()?;

    let registry: StopRegistry = load_stops(&config.stops_path)?.into_iter().collect();

    let options = TimetableOptions {
        route_types: config.route_types.clone(),
        time_window: config.time_window(),
    };
    let timetable = load_timetable(&gtfs_dir(config), &registry, date, &options)?;
    let realtime = load_realtime(&config.realtime_dir, &config.region, date)?;

    if config.output_unlabelled_bulk {
        write_unlabelled(&config.unlabelled_path(), &realtime.unlabelled)?;
    }

    let records = reconcile(&realtime.labelled, &timetable.service_stops);
    let stops = punctuality_by_stop(&records);
    if stops.is_empty() {
        warn!("No stop-visits matched between timetable and realtime");
    }
    write_stop_punctuality(&config.stop_punctuality_path(), &stops)?;

    let mut summary = RunSummary::new(&config.region, &format_date(date))
        .with_timetable(&timetable)
        .with_realtime(&realtime);
    summary.registry_stops = registry.len();
    summary.matched = records.len();
    summary.punctual = records.iter().filter(|r| r.punctual).count();
    summary.stops_scored = stops.len();

    info!(
        matched = summary.matched,
        match_pct = summary.match_pct(),
        stops = summary.stops_scored,
        "Schedule built"
    );
    print_json(&summary)?;
    append_record(&config.run_summary_path(), &summary)?;

    Ok(summary)
}

/// Aggregates a stop-level punctuality file to `level` and writes the result
/// to the level's output path, which is returned.
#[tracing::instrument(skip_all, fields(level = %level, input = %input.display()))]
pub fn analyze_geography(
    config: &PipelineConfig,
    level: &str,
    input: &Path,
    full_coverage: bool,
) -> Result<(PathBuf, GeographyReport)> {
    let columns = config.geography(level)?;
    let stops = load_stop_punctuality(input)?;
    let lookup = load_lookup(&config.lookup_path, columns)?;

    let report = aggregate_by_geography(&stops, &lookup, full_coverage);

    let path = config.geography_punctuality_path(level);
    write_geography_punctuality(&path, columns, &report.rows)?;
    info!(
        units = report.rows.len(),
        unmatched = report.unmatched_stops,
        "Geography punctuality written"
    );

    Ok((path, report))
}
