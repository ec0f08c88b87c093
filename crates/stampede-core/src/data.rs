//! Cyclic row iteration over fixture files.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult};

/// One fixture record: field name to value.
pub type Row = Map<String, Value>;

/// Fixture file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Yaml,
    Json,
}

impl DataFormat {
    /// Classify `path` by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(CoreError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{extension}")
                },
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Thread-safe cyclic iterator over rows loaded once from a file.
///
/// The row set is never empty: an empty or unparsable source is replaced by a
/// single empty row so callers can always draw from it.
#[derive(Debug)]
pub struct DataLoader {
    path: PathBuf,
    rows: Vec<Row>,
    cursor: Mutex<usize>,
}

impl DataLoader {
    /// Load a fixture file. Fails on an unsupported extension (checked first) or a
    /// missing file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let format = DataFormat::from_path(path)?;
        if !path.exists() {
            return Err(CoreError::not_found("data file", path.display().to_string()));
        }

        let rows = match read_rows(path, format) {
            Ok(rows) => rows,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load data file");
                Vec::new()
            }
        };

        Ok(Self::from_rows_at(path, rows))
    }

    /// Build a loader over in-memory rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::from_rows_at(Path::new("<memory>"), rows)
    }

    fn from_rows_at(path: &Path, mut rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            warn!(path = %path.display(), "Data source is empty, using a placeholder row");
            rows.push(Row::new());
        } else {
            debug!(path = %path.display(), rows = rows.len(), "Loaded data rows");
        }
        Self {
            path: path.to_path_buf(),
            rows,
            cursor: Mutex::new(0),
        }
    }

    /// Next row, wrapping around after the last one.
    pub fn next(&self) -> Row {
        let mut cursor = self.cursor.lock();
        let row = self.rows[*cursor].clone();
        *cursor = (*cursor + 1) % self.rows.len();
        row
    }

    /// Every row, in source order.
    pub fn all(&self) -> Vec<Row> {
        self.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false; an empty source holds a placeholder row.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_rows(path: &Path, format: DataFormat) -> Result<Vec<Row>, String> {
    match format {
        DataFormat::Csv => read_csv(path),
        DataFormat::Yaml => {
            let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let value: Value = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;
            Ok(rows_from_value(value))
        }
        DataFormat::Json => {
            let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let value: Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
            Ok(rows_from_value(value))
        }
    }
}

/// Ragged rows are tolerated: missing trailing fields read as null and extra fields
/// are dropped. A record that cannot be read ends the file, keeping earlier rows.
fn read_csv(path: &Path) -> Result<Vec<Row>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), rows = rows.len(), error = %e, "Stopped reading CSV data file early");
                break;
            }
        };
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let value = record
                    .get(i)
                    .map_or(Value::Null, |value| Value::String(value.to_string()));
                (field.to_string(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn rows_from_value(value: Value) -> Vec<Row> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(row_from_item).collect(),
        other => vec![row_from_item(other)],
    }
}

fn row_from_item(item: Value) -> Row {
    match item {
        Value::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}
