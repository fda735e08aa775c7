//! Stop registry: canonical stop identifiers with WGS84 coordinates.
//!
//! Reads a NaPTAN-style export (`ATCOCode`, `Latitude`, `Longitude`,
//! `Easting`, `Northing`, `Status`). GTFS-style `stop_id`/`stop_lat`/
//! `stop_lon` headers are accepted as well.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::loaders::osgb::easting_northing_to_lat_lon;
use crate::table::{find_column, reader};

const ACTIVE_STATUSES: &[&str] = &["active", "act"];

#[derive(Debug, Deserialize)]
struct RegistryRow {
    #[serde(rename = "ATCOCode", alias = "stop_id")]
    stop_id: String,
    #[serde(rename = "Latitude", alias = "stop_lat")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude", alias = "stop_lon")]
    longitude: Option<f64>,
    #[serde(rename = "Easting", alias = "easting")]
    easting: Option<f64>,
    #[serde(rename = "Northing", alias = "northing")]
    northing: Option<f64>,
    #[serde(rename = "Status", alias = "status")]
    status: Option<String>,
}

impl RegistryRow {
    fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| ACTIVE_STATUSES.iter().any(|a| s.eq_ignore_ascii_case(a)))
    }

    /// Existing lat/lon values win; gaps are filled from easting/northing.
    fn into_stop(self) -> Result<Stop> {
        let easting = self.easting.filter(|v| v.is_finite());
        let northing = self.northing.filter(|v| v.is_finite());
        let converted = match (easting, northing) {
            (Some(e), Some(n)) => Some(easting_northing_to_lat_lon(e, n)),
            _ => None,
        };

        let stop_lat = self.latitude.filter(|v| v.is_finite()).or(converted.map(|c| c.0));
        let stop_lon = self.longitude.filter(|v| v.is_finite()).or(converted.map(|c| c.1));

        match (stop_lat, stop_lon) {
            (Some(stop_lat), Some(stop_lon)) => Ok(Stop {
                stop_id: self.stop_id,
                stop_lat,
                stop_lon,
            }),
            _ => Err(PipelineError::MissingCoordinate {
                stop_id: self.stop_id,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

/// Loads active stops from `path`, resolving missing coordinates from the
/// National Grid columns.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_stops(path: &Path) -> Result<Vec<Stop>> {
    let mut rdr = reader(path, true)?;
    let headers = rdr.headers()?.clone();
    if find_column(&headers, &["ATCOCode", "stop_id"]).is_none() {
        return Err(PipelineError::schema(path, "ATCOCode"));
    }
    if find_column(&headers, &["Status", "status"]).is_none() {
        return Err(PipelineError::schema(path, "Status"));
    }

    let mut stops = Vec::new();
    let mut inactive = 0usize;
    let mut converted = 0usize;
    for result in rdr.deserialize() {
        let row: RegistryRow = result?;
        if !row.is_active() {
            inactive += 1;
            continue;
        }
        if row.latitude.is_none() || row.longitude.is_none() {
            converted += 1;
        }
        stops.push(row.into_stop()?);
    }

    debug!(inactive, converted, "Stop registry filtered");
    info!(stops = stops.len(), "Stop registry loaded");
    Ok(stops)
}

/// Stop lookup by id, used for the timetable's left join.
#[derive(Debug, Default)]
pub struct StopRegistry {
    stops: HashMap<String, Stop>,
}

impl StopRegistry {
    pub fn get(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

impl FromIterator<Stop> for StopRegistry {
    /// The first row wins when a stop id repeats.
    fn from_iter<I: IntoIterator<Item = Stop>>(iter: I) -> Self {
        let mut stops = HashMap::new();
        for stop in iter {
            stops.entry(stop.stop_id.clone()).or_insert(stop);
        }
        Self { stops }
    }
}
