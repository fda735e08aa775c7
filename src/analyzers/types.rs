//! Data types produced by the reconciliation and aggregation stages.

use serde::{Deserialize, Serialize};

use crate::loaders::timetable::ServiceStop;

/// A scheduled stop-visit matched to the last ping observed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRecord {
    pub service_stop: ServiceStop,
    pub bus_id: String,
    pub time_transpond: i64,
    /// `scheduled_arrival_unix - time_transpond`: positive when early, negative when late.
    pub relative_punctuality: i64,
    pub punctual: bool,
}

/// Punctuality of one stop. Also the on-disk row of the stop-level output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPunctuality {
    pub stop_id: String,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub service_stops: u64,
    pub punctuality_rate: f64,
}

/// A stop punctuality row after the left join onto the geography lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledStop {
    pub stop: StopPunctuality,
    pub geography_code: Option<String>,
    pub geography_name: Option<String>,
}

/// Punctuality of one geography unit. Header names depend on the level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeographyPunctuality {
    pub geography_code: String,
    pub geography_name: String,
    pub service_stops: u64,
    pub punctual_service_stops: u64,
    pub punctuality_rate: f64,
}
