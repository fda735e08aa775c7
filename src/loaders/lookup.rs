//! Stop to geography lookup table.
//!
//! The lookup carries code/name columns for several geography levels side
//! by side; only the pair chosen by the caller is read.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::info;

use crate::config::GeographyColumns;
use crate::error::{PipelineError, Result};
use crate::table::{find_column, reader};

const KEY_COLUMNS: [&str; 3] = ["stop_id", "stop_lat", "stop_lon"];

#[derive(Debug, Clone, PartialEq)]
pub struct LookupRow {
    pub stop_id: String,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub geography_code: Option<String>,
    pub geography_name: Option<String>,
}

/// Join key on `(stop_id, stop_lat, stop_lon)`, comparing coordinates bitwise.
pub type StopKey = (String, Option<u64>, Option<u64>);

pub fn stop_key(stop_id: &str, stop_lat: Option<f64>, stop_lon: Option<f64>) -> StopKey {
    (
        stop_id.to_string(),
        stop_lat.map(f64::to_bits),
        stop_lon.map(f64::to_bits),
    )
}

#[derive(Debug, Default)]
pub struct LookupTable {
    rows: Vec<LookupRow>,
    index: HashMap<StopKey, Vec<usize>>,
}

impl LookupTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every lookup row matching the key. Several matches multiply the joined rows.
    pub fn matches<'a>(&'a self, key: &StopKey) -> impl Iterator<Item = &'a LookupRow> + use<'a> {
        self.index
            .get(key)
            .into_iter()
            .flatten()
            .map(|&i| &self.rows[i])
    }

    /// Distinct `(code, name)` pairs with both values present, sorted.
    pub fn units(&self) -> BTreeSet<(String, String)> {
        self.rows
            .iter()
            .filter_map(|r| Some((r.geography_code.clone()?, r.geography_name.clone()?)))
            .collect()
    }
}

impl FromIterator<LookupRow> for LookupTable {
    fn from_iter<I: IntoIterator<Item = LookupRow>>(iter: I) -> Self {
        let rows: Vec<LookupRow> = iter.into_iter().collect();
        let mut index: HashMap<StopKey, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            index
                .entry(stop_key(&row.stop_id, row.stop_lat, row.stop_lon))
                .or_default()
                .push(i);
        }
        Self { rows, index }
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn optional_coordinate(path: &Path, line: u64, value: Option<&str>) -> Result<Option<f64>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|e| PipelineError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                message: format!("invalid coordinate '{}': {}", v, e),
            }),
    }
}

/// Reads the lookup at `path`, keeping the key columns plus `columns`.
#[tracing::instrument(skip_all, fields(path = %path.display(), code = %columns.code))]
pub fn load_lookup(path: &Path, columns: &GeographyColumns) -> Result<LookupTable> {
    let mut rdr = reader(path, true)?;
    let headers = rdr.headers()?.clone();

    let mut indices = Vec::with_capacity(5);
    for name in KEY_COLUMNS
        .iter()
        .copied()
        .chain([columns.code.as_str(), columns.name.as_str()])
    {
        let idx = find_column(&headers, &[name]).ok_or_else(|| PipelineError::schema(path, name))?;
        indices.push(idx);
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let field = |i: usize| record.get(indices[i]);
        rows.push(LookupRow {
            stop_id: field(0).unwrap_or_default().to_string(),
            stop_lat: optional_coordinate(path, line, field(1))?,
            stop_lon: optional_coordinate(path, line, field(2))?,
            geography_code: optional_text(field(3)),
            geography_name: optional_text(field(4)),
        });
    }

    let table: LookupTable = rows.into_iter().collect();
    info!(rows = table.len(), "Geography lookup loaded");
    Ok(table)
}
