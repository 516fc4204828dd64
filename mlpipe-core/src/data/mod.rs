//! Data stages: schema, tables, record sources, ingestion, validation and transformation.

pub mod ingest;
pub mod schema;
pub mod source;
pub mod table;
pub mod transform;
pub mod validate;

pub use ingest::{DataIngestion, split_train_test};
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use source::{CsvRecordSource, RecordSource, SourceInfo, SqliteRecordSource};
pub use table::Table;
pub use transform::{DataTransformation, Preprocessor, TargetValueMapping, TransformedData};
pub use validate::{DataValidation, MissingColumns, ValidationReport, ValidationStage};
