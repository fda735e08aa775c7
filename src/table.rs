//! CSV table access shared by the loaders.
//!
//! Every table is read through [`read_table`], which turns a missing file
//! into [`PipelineError::InputNotFound`] and a missing column into
//! [`PipelineError::SchemaMismatch`] before any row is deserialized.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Opens `path` for reading, transparently decompressing `.gz` files.
pub fn open(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::not_found(path),
        _ => PipelineError::Io(e),
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Builds a CSV reader over `path`. Fields are trimmed; rows may vary in length.
pub fn reader(path: &Path, has_headers: bool) -> Result<csv::Reader<Box<dyn Read>>> {
    Ok(ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(open(path)?))
}

/// Index of the first header matching any of `names`.
pub fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.contains(&h))
}

/// Fails with [`PipelineError::SchemaMismatch`] on the first column of
/// `required` not present in `headers`.
pub fn require_columns(path: &Path, headers: &StringRecord, required: &[&str]) -> Result<()> {
    match required.iter().find(|c| find_column(headers, &[**c]).is_none()) {
        Some(missing) => Err(PipelineError::schema(path, missing)),
        None => Ok(()),
    }
}

/// Reads a headed CSV file into typed rows after checking `required` columns.
pub fn read_table<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<Vec<T>> {
    let mut rdr = reader(path, true)?;
    let headers = rdr.headers()?.clone();
    require_columns(path, &headers, required)?;

    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()?;

    debug!(path = %path.display(), rows = rows.len(), "Loaded table");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    #[derive(Debug, Deserialize)]
    struct Row {
        id: String,
        value: Option<f64>,
    }

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_read_table_missing_file() {
        let result = read_table::<Row>(Path::new("does/not/exist.csv"), &["id"]);
        assert!(matches!(result, Err(PipelineError::InputNotFound { .. })));
    }

    #[test]
    fn test_read_table_missing_column() {
        let path = temp_path("bus_metrics_table_missing_col.csv");
        fs::write(&path, "id,other\na,1\n").unwrap();

        let result = read_table::<Row>(&path, &["id", "value"]);
        match result {
            Err(PipelineError::SchemaMismatch { column, .. }) => assert_eq!(column, "value"),
            other => panic!("expected schema mismatch, got {:?}", other),
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_table_empty_field_is_none() {
        let path = temp_path("bus_metrics_table_empty_field.csv");
        fs::write(&path, "id,value\n a ,\nb,2.5\n").unwrap();

        let rows = read_table::<Row>(&path, &["id", "value"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].value, None);
        assert_eq!(rows[1].value, Some(2.5));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_gzip_table() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let path = temp_path("bus_metrics_table.csv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"id,value\nx,1\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let rows = read_table::<Row>(&path, &["id"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "x");

        fs::remove_file(&path).unwrap();
    }
}
