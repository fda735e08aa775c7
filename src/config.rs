//! Run configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none at all) yields a usable config. The CLI overrides
//! individual fields after loading.
//!
//! ```toml
//! region = "north_east"
//! date = "20231101"
//! partial_timetable = true
//! time_from = 7.0
//! time_to = 10.0
//! route_types = [3]
//!
//! [boundaries.lsoa]
//! code = "LSOA21CD"
//! name = "LSOA21NM"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::loaders::timetable::RouteType;
use crate::time::{format_date, parse_date};

/// Column pair naming one geography level in the lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeographyColumns {
    pub code: String,
    pub name: String,
}

impl GeographyColumns {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub region: String,
    /// Target day as `YYYYMMDD`.
    pub date: String,
    pub time_from: f64,
    pub time_to: f64,
    pub partial_timetable: bool,
    pub route_types: Vec<RouteType>,
    pub output_unlabelled_bulk: bool,
    pub timetable_dir: PathBuf,
    pub realtime_dir: PathBuf,
    pub stops_path: PathBuf,
    pub lookup_path: PathBuf,
    pub output_dir: PathBuf,
    pub boundaries: BTreeMap<String, GeographyColumns>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let boundaries = [
            ("lsoa", "LSOA21CD", "LSOA21NM"),
            ("msoa", "MSOA21CD", "MSOA21NM"),
            ("lad", "LAD23CD", "LAD23NM"),
            ("region", "RGN23CD", "RGN23NM"),
            ("ttwa", "TTWA11CD", "TTWA11NM"),
        ]
        .into_iter()
        .map(|(level, code, name)| (level.to_string(), GeographyColumns::new(code, name)))
        .collect();

        Self {
            region: "north_east".to_string(),
            date: format_date(Local::now().date_naive()),
            time_from: 7.0,
            time_to: 10.0,
            partial_timetable: false,
            route_types: vec![RouteType::Bus],
            output_unlabelled_bulk: false,
            timetable_dir: PathBuf::from("data/timetable"),
            realtime_dir: PathBuf::from("data/realtime"),
            stops_path: PathBuf::from("data/resources/gb_stops.csv"),
            lookup_path: PathBuf::from("data/resources/geography_lookup_table.csv"),
            output_dir: PathBuf::from("outputs"),
            boundaries,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::not_found(path),
            _ => PipelineError::Io(e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: PipelineConfig = toml::from_str(content)?;
        config.normalise_date()?;
        Ok(config)
    }

    /// Validates `date` and rewrites it as `YYYYMMDD`.
    pub fn normalise_date(&mut self) -> Result<()> {
        self.date = format_date(self.target_date()?);
        Ok(())
    }

    pub fn target_date(&self) -> Result<NaiveDate> {
        parse_date(&self.date)
    }

    /// `date` as `YYYYMMDD`, as used in input and output file names.
    pub fn date_stamp(&self) -> String {
        self.target_date()
            .map(format_date)
            .unwrap_or_else(|_| self.date.clone())
    }

    /// Looks up the code/name column pair for a geography level.
    pub fn geography(&self, level: &str) -> Result<&GeographyColumns> {
        self.boundaries
            .get(level)
            .ok_or_else(|| PipelineError::UnknownGeography(level.to_string()))
    }

    /// Requested time window in hours of day, when partial timetables are on.
    pub fn time_window(&self) -> Option<(f64, f64)> {
        self.partial_timetable
            .then_some((self.time_from, self.time_to))
    }

    pub fn stop_punctuality_path(&self) -> PathBuf {
        self.output_dir.join("stop_level_punctuality").join(format!(
            "punctuality_by_stop_{}_{}.csv",
            self.region,
            self.date_stamp()
        ))
    }

    pub fn geography_punctuality_path(&self, level: &str) -> PathBuf {
        self.output_dir
            .join("punctuality")
            .join(format!("{}.csv", level))
    }

    pub fn unlabelled_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("unlabelled_{}_{}.csv", self.region, self.date_stamp()))
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.output_dir.join("run_summary.csv")
    }
}
