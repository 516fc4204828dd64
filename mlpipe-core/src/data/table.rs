//! In-memory tabular data loaded from delimited files.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TableError;
use crate::persistence;

/// Ordered rows of typed cells under named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Create a table with the given header and no rows.
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn {
                column: name.to_string(),
            })?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).unwrap_or(&Value::Null))
            .collect())
    }

    /// A new table holding the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// A new table without the named columns. Names not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !names.iter().any(|n| n.as_ref() == c.as_str()))
            .map(|(i, _)| i)
            .collect();
        Self {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    keep.iter()
                        .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect(),
        }
    }

    /// Append a row. Short rows are padded with nulls.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Read a comma-delimited file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file).map_err(|e| match e {
            TableError::Empty { .. } => TableError::Empty {
                path: path.to_path_buf(),
            },
            other => other,
        })
    }

    /// Parse CSV from any reader (e.g. a downloaded blob).
    ///
    /// Header names are kept verbatim; only data fields are trimmed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Fields)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(TableError::Empty {
                path: "<reader>".into(),
            });
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(parse_cell).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Serialize to CSV bytes with a header row.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(render_cell))?;
        }
        wtr.into_inner()
            .map_err(|e| TableError::Csv(csv::Error::from(e.into_error())))
    }

    /// Atomically write the table as CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let bytes = self.to_csv_bytes()?;
        persistence::atomic_write(path, &bytes).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Type a raw CSV cell: integer, float, boolean, string; blank or `na` is null.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match s {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric view of a cell. Booleans count as 0/1; numeric strings are parsed.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Categorical view of a cell, used as an encoding key.
pub fn value_as_category(value: &Value) -> String {
    render_cell(value)
}
