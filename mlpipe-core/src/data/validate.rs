//! Schema gate for ingested train/test tables.
//!
//! A validation run walks `Start -> LoadTables -> CheckTrain -> CheckTest ->
//! WriteReport -> Done`. Every check result is computed before anything is
//! written, and the report is written atomically, so a failed run (`Failed`)
//! never leaves a report that disagrees with what was returned.
//!
//! Two independent checks are applied to each table:
//! - [`validate_column_count`] compares only the number of columns, not their
//!   names. A table with a renamed column still passes it.
//! - [`validate_required_columns`] requires every numerical and every
//!   categorical schema column to be present by name.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{DataIngestionArtifact, DataValidationArtifact};
use crate::config::DataValidationConfig;
use crate::data::schema::SchemaDefinition;
use crate::data::table::Table;
use crate::error::ValidationRunError;
use crate::persistence;

/// States of one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Start,
    LoadTables,
    CheckTrain,
    CheckTest,
    WriteReport,
    Done,
    Failed,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::LoadTables => "load_tables",
            Self::CheckTrain => "check_train",
            Self::CheckTest => "check_test",
            Self::WriteReport => "write_report",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The report persisted at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validation_status: bool,
    pub message: String,
}

impl ValidationReport {
    /// Build a report from concatenated violations; an empty message passes.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            validation_status: message.is_empty(),
            message,
        }
    }

    /// Serialize and atomically replace the report at `path`.
    pub fn write(&self, path: &Path) -> Result<(), ValidationRunError> {
        let yaml = serde_yaml::to_string(self).map_err(|source| ValidationRunError::Serialize {
            stage: ValidationStage::WriteReport,
            source,
        })?;
        persistence::atomic_write(path, yaml.as_bytes()).map_err(|source| {
            ValidationRunError::WriteReport {
                stage: ValidationStage::WriteReport,
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Read a previously written report.
    pub fn read(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Schema feature columns absent from a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingColumns {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
}

impl MissingColumns {
    pub fn is_empty(&self) -> bool {
        self.numerical.is_empty() && self.categorical.is_empty()
    }

    /// `missing numerical columns [Age], missing categorical columns [Gender]`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.numerical.is_empty() {
            parts.push(format!(
                "missing numerical columns [{}]",
                self.numerical.join(", ")
            ));
        }
        if !self.categorical.is_empty() {
            parts.push(format!(
                "missing categorical columns [{}]",
                self.categorical.join(", ")
            ));
        }
        parts.join(", ")
    }
}

/// True iff the table has exactly as many columns as the schema declares.
pub fn validate_column_count(table: &Table, schema: &SchemaDefinition) -> bool {
    let status = table.column_count() == schema.column_count();
    tracing::debug!(
        expected = schema.column_count(),
        found = table.column_count(),
        status,
        "Column count check"
    );
    status
}

/// Numerical and categorical schema columns not present in the table.
///
/// The two partitions are checked and reported independently.
pub fn find_missing_columns(table: &Table, schema: &SchemaDefinition) -> MissingColumns {
    let absent = |names: &[String]| -> Vec<String> {
        names
            .iter()
            .filter(|name| !table.has_column(name))
            .cloned()
            .collect()
    };
    let missing = MissingColumns {
        numerical: absent(&schema.numerical_columns),
        categorical: absent(&schema.categorical_columns),
    };
    if !missing.numerical.is_empty() {
        tracing::info!(columns = ?missing.numerical, "Missing numerical columns");
    }
    if !missing.categorical.is_empty() {
        tracing::info!(columns = ?missing.categorical, "Missing categorical columns");
    }
    missing
}

/// True iff every numerical and categorical schema column is present.
pub fn validate_required_columns(table: &Table, schema: &SchemaDefinition) -> bool {
    find_missing_columns(table, schema).is_empty()
}

/// Violation fragments for one table, in check order: count, then presence.
pub fn check_table(table: &Table, schema: &SchemaDefinition, dataset: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if !validate_column_count(table, schema) {
        violations.push(format!(
            "Columns are missing in {dataset} dataframe: expected {} columns, found {}",
            schema.column_count(),
            table.column_count()
        ));
    }
    let missing = find_missing_columns(table, schema);
    if !missing.is_empty() {
        violations.push(format!(
            "Columns are missing in {dataset} dataframe: {}",
            missing.describe()
        ));
    }
    violations
}

/// The data validation stage.
pub struct DataValidation {
    config: DataValidationConfig,
    schema: SchemaDefinition,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig, schema: SchemaDefinition) -> Self {
        Self { config, schema }
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Validate the ingested tables and persist the report.
    pub fn run(
        &self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact, ValidationRunError> {
        tracing::info!("Starting data validation");
        let mut stage = ValidationStage::Start;
        match self.execute(ingestion, &mut stage) {
            Ok(artifact) => {
                advance(&mut stage, ValidationStage::Done);
                tracing::info!(
                    status = artifact.validation_status,
                    report = %artifact.validation_report_file_path.display(),
                    "Data validation artifact created"
                );
                Ok(artifact)
            }
            Err(e) => {
                let failed_at = stage;
                advance(&mut stage, ValidationStage::Failed);
                tracing::error!(stage = %failed_at, error = %e, "Data validation run failed");
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        ingestion: &DataIngestionArtifact,
        stage: &mut ValidationStage,
    ) -> Result<DataValidationArtifact, ValidationRunError> {
        advance(stage, ValidationStage::LoadTables);
        let load = |path: &Path| {
            Table::read_csv(path).map_err(|source| ValidationRunError::LoadTable {
                stage: ValidationStage::LoadTables,
                path: path.to_path_buf(),
                source,
            })
        };
        let train = load(&ingestion.trained_file_path)?;
        let test = load(&ingestion.test_file_path)?;

        advance(stage, ValidationStage::CheckTrain);
        let mut violations = check_table(&train, &self.schema, "training");
        if violations.is_empty() {
            tracing::info!("All required columns are present in training dataframe");
        }

        advance(stage, ValidationStage::CheckTest);
        let test_violations = check_table(&test, &self.schema, "testing");
        if test_violations.is_empty() {
            tracing::info!("All required columns are present in testing dataframe");
        }
        violations.extend(test_violations);

        let report = ValidationReport::from_message(violations.join("; "));

        advance(stage, ValidationStage::WriteReport);
        let report_path = &self.config.validation_report_file_path;
        report.write(report_path)?;

        Ok(DataValidationArtifact {
            validation_status: report.validation_status,
            validation_report_file_path: report_path.clone(),
            message: report.message,
        })
    }
}

fn advance(stage: &mut ValidationStage, next: ValidationStage) {
    tracing::debug!(from = %stage, to = %next, "Validation stage transition");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::from_yaml_str(
            "columns: [Age, Gender, Vintage]\nnumerical_columns: [Age]\ncategorical_columns: [Gender]\n",
        )
        .unwrap()
    }

    fn table(columns: &[&str]) -> Table {
        Table::with_columns(columns)
    }

    #[test]
    fn test_column_count_ignores_names() {
        let s = schema();
        assert!(validate_column_count(&table(&["x", "y", "z"]), &s));
        assert!(!validate_column_count(&table(&["Age", "Gender"]), &s));
    }

    #[test]
    fn test_required_columns_present() {
        assert!(validate_required_columns(
            &table(&["Age", "Gender", "Vintage"]),
            &schema()
        ));
    }

    #[test]
    fn test_missing_numerical_reported_by_name() {
        let missing = find_missing_columns(&table(&["Gender", "Vintage"]), &schema());
        assert_eq!(missing.numerical, vec!["Age"]);
        assert!(missing.categorical.is_empty());
    }

    // Missing categorical columns used to be folded into the numerical list
    // while the categorical list stayed empty. They are reported on their own.
    #[test]
    fn test_missing_categorical_reported_separately() {
        let t = table(&["Age", "Vintage", "Region_Code"]);
        let missing = find_missing_columns(&t, &schema());
        assert!(missing.numerical.is_empty());
        assert_eq!(missing.categorical, vec!["Gender"]);
        assert!(!validate_required_columns(&t, &schema()));
        assert_eq!(missing.describe(), "missing categorical columns [Gender]");
    }

    #[test]
    fn test_check_table_order_and_wording() {
        let violations = check_table(&table(&["Vintage"]), &schema(), "training");
        assert_eq!(
            violations,
            vec![
                "Columns are missing in training dataframe: expected 3 columns, found 1"
                    .to_string(),
                "Columns are missing in training dataframe: missing numerical columns [Age], \
                 missing categorical columns [Gender]"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_report_from_message() {
        assert!(ValidationReport::from_message("").validation_status);
        assert!(!ValidationReport::from_message("bad").validation_status);
    }

    #[test]
    fn test_report_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("report.yaml");
        let report = ValidationReport {
            validation_status: false,
            message: "Columns are missing in testing dataframe: x: \"quoted\"".into(),
        };
        report.write(&path).unwrap();
        assert_eq!(ValidationReport::read(&path).unwrap(), report);
    }

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_run_passing() {
        let dir = TempDir::new().unwrap();
        let ingestion = DataIngestionArtifact {
            trained_file_path: write_csv(dir.path(), "train.csv", "Age,Gender,Vintage\n30,Male,10\n"),
            test_file_path: write_csv(dir.path(), "test.csv", "Age,Gender,Vintage\n41,Female,7\n"),
        };
        let report_path = dir.path().join("validation").join("report.yaml");
        let validation =
            DataValidation::new(DataValidationConfig::with_report_path(&report_path), schema());

        let artifact = validation.run(&ingestion).unwrap();
        assert!(artifact.validation_status);
        assert_eq!(artifact.message, "");
        assert_eq!(artifact.validation_report_file_path, report_path);
        assert_eq!(
            ValidationReport::read(&report_path).unwrap(),
            ValidationReport {
                validation_status: true,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_run_rejects_padded_header() {
        let dir = TempDir::new().unwrap();
        let ingestion = DataIngestionArtifact {
            trained_file_path: write_csv(dir.path(), "train.csv", "Age,  Gender  ,Vintage\n30,Male,10\n"),
            test_file_path: write_csv(dir.path(), "test.csv", "Age,Gender,Vintage\n41,Female,7\n"),
        };
        let report_path = dir.path().join("report.yaml");
        let artifact = DataValidation::new(DataValidationConfig::with_report_path(&report_path), schema())
            .run(&ingestion)
            .unwrap();
        assert!(!artifact.validation_status);
        assert!(artifact.message.contains("missing categorical columns [Gender]"));
    }

    #[test]
    fn test_run_message_order_across_tables() {
        let dir = TempDir::new().unwrap();
        let ingestion = DataIngestionArtifact {
            trained_file_path: write_csv(dir.path(), "train.csv", "Gender,Vintage\nMale,10\n"),
            test_file_path: write_csv(dir.path(), "test.csv", "Age,Vintage\n41,7\n"),
        };
        let validation = DataValidation::new(
            DataValidationConfig::with_report_path(dir.path().join("report.yaml")),
            schema(),
        );
        let artifact = validation.run(&ingestion).unwrap();
        assert!(!artifact.validation_status);

        let fragments: Vec<&str> = artifact.message.split("; ").collect();
        assert_eq!(fragments.len(), 4);
        assert!(fragments[0].starts_with("Columns are missing in training dataframe: expected"));
        assert!(fragments[1].ends_with("missing numerical columns [Age]"));
        assert!(fragments[2].starts_with("Columns are missing in testing dataframe: expected"));
        assert!(fragments[3].ends_with("missing categorical columns [Gender]"));
    }

    #[test]
    fn test_failed_run_keeps_previous_report() {
        let dir = TempDir::new().unwrap();
        let train = write_csv(dir.path(), "train.csv", "Age,Gender,Vintage\n30,Male,10\n");
        let test = write_csv(dir.path(), "test.csv", "Age,Gender,Vintage\n41,Female,7\n");
        let report_path = dir.path().join("report.yaml");
        let validation =
            DataValidation::new(DataValidationConfig::with_report_path(&report_path), schema());
        let ingestion = DataIngestionArtifact {
            trained_file_path: train,
            test_file_path: test.clone(),
        };
        validation.run(&ingestion).unwrap();
        let before = std::fs::read_to_string(&report_path).unwrap();

        std::fs::remove_file(&test).unwrap();
        let err = validation.run(&ingestion).unwrap_err();
        assert_eq!(err.stage(), ValidationStage::LoadTables);
        assert!(matches!(err, ValidationRunError::LoadTable { ref path, .. } if *path == test));
        assert_eq!(std::fs::read_to_string(&report_path).unwrap(), before);
    }

    #[test]
    fn test_failed_run_writes_no_report() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("out").join("report.yaml");
        let validation =
            DataValidation::new(DataValidationConfig::with_report_path(&report_path), schema());
        let ingestion = DataIngestionArtifact {
            trained_file_path: dir.path().join("absent_train.csv"),
            test_file_path: dir.path().join("absent_test.csv"),
        };
        assert!(validation.run(&ingestion).is_err());
        assert!(!report_path.exists());
    }
}
