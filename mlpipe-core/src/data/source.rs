//! Record sources the ingestion stage exports from.
//!
//! The document database is an external collaborator; the pipeline only needs
//! something that returns a flat table. Two implementations are provided: a
//! CSV export and a local SQLite table standing in for a collection.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::table::Table;
use crate::error::PipelineError;

/// Where a table came from, for logging and lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: DateTime<Utc>,
}

/// A source of raw records returned as a flat table.
pub trait RecordSource: Send + Sync {
    /// Fetch every record.
    fn fetch(&self) -> Result<Table, PipelineError>;

    /// Describe this source.
    fn describe(&self) -> SourceInfo;
}

/// A CSV export of the collection.
pub struct CsvRecordSource {
    pub path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvRecordSource {
    fn fetch(&self) -> Result<Table, PipelineError> {
        Ok(Table::read_csv(&self.path)?)
    }

    fn describe(&self) -> SourceInfo {
        SourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: Utc::now(),
        }
    }
}

/// A SQLite table read in full, one row per record.
pub struct SqliteRecordSource {
    pub db_path: PathBuf,
    pub collection: String,
}

impl SqliteRecordSource {
    pub fn new(db_path: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            collection: collection.into(),
        }
    }

    /// Build from a connection URL (`sqlite://path` or a bare path).
    pub fn from_url(url: &str, collection: impl Into<String>) -> Self {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new(path, collection)
    }

    fn query(&self) -> String {
        format!("SELECT * FROM \"{}\"", self.collection.replace('"', "\"\""))
    }
}

impl RecordSource for SqliteRecordSource {
    fn fetch(&self) -> Result<Table, PipelineError> {
        let sqlite_err = |e: rusqlite::Error| {
            PipelineError::source_failure(format!(
                "{} ({}): {e}",
                self.db_path.display(),
                self.collection
            ))
        };

        let conn = rusqlite::Connection::open_with_flags(
            &self.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(sqlite_err)?;
        let query = self.query();
        let mut stmt = conn.prepare(&query).map_err(sqlite_err)?;
        let column_count = stmt.column_count();
        let columns: Vec<String> = (0..column_count)
            .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
            .collect();

        let mut rows = Vec::new();
        let mut result_rows = stmt.query([]).map_err(sqlite_err)?;
        while let Some(row) = result_rows.next().map_err(sqlite_err)? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let val = match row.get_ref(i) {
                    Ok(rusqlite::types::ValueRef::Null) => Value::Null,
                    Ok(rusqlite::types::ValueRef::Integer(n)) => serde_json::json!(n),
                    Ok(rusqlite::types::ValueRef::Real(f)) => serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    Ok(rusqlite::types::ValueRef::Text(t)) => {
                        Value::String(String::from_utf8_lossy(t).into_owned())
                    }
                    Ok(rusqlite::types::ValueRef::Blob(_)) | Err(_) => Value::Null,
                };
                values.push(val);
            }
            rows.push(values);
        }

        tracing::info!(
            source = %self.db_path.display(),
            collection = %self.collection,
            rows = rows.len(),
            "Fetched records"
        );
        Ok(Table::new(columns, rows))
    }

    fn describe(&self) -> SourceInfo {
        SourceInfo {
            source_type: "sqlite".to_string(),
            location: format!("{}#{}", self.db_path.display(), self.collection),
            accessed_at: Utc::now(),
        }
    }
}
