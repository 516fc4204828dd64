//! Schema registry: the declarative description of expected columns.
//!
//! The schema file is YAML with the required keys `columns`,
//! `numerical_columns` and `categorical_columns`. `columns` entries may be a
//! bare name or a single-entry `name: dtype` map. Unknown keys are rejected.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::TARGET_COLUMN;
use crate::error::ConfigError;

/// Declared data type of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Category,
    Boolean,
    Unknown,
}

impl ColumnType {
    /// Map a dtype label (`int`, `float64`, `category`, ...) to a column type.
    pub fn from_dtype(dtype: &str) -> Self {
        match dtype.trim().to_ascii_lowercase().as_str() {
            "int" | "int32" | "int64" | "integer" => Self::Integer,
            "float" | "float32" | "float64" | "double" => Self::Float,
            "category" | "object" | "str" | "string" => Self::Category,
            "bool" | "boolean" => Self::Boolean,
            _ => Self::Unknown,
        }
    }
}

/// Schema for a single expected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: Option<ColumnType>,
}

/// Validated, immutable schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
    pub numerical_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub target_column: String,
    pub drop_columns: Vec<String>,
    pub num_features: Vec<String>,
    pub mm_columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Name(String),
    Typed(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    columns: Vec<RawColumn>,
    numerical_columns: Vec<String>,
    categorical_columns: Vec<String>,
    #[serde(default = "default_target_column")]
    target_column: String,
    #[serde(default)]
    drop_columns: Vec<String>,
    #[serde(default)]
    num_features: Vec<String>,
    #[serde(default)]
    mm_columns: Vec<String>,
}

fn default_target_column() -> String {
    TARGET_COLUMN.to_string()
}

impl SchemaDefinition {
    /// Load and validate a schema file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let schema = Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::Malformed { message, .. } => ConfigError::Malformed {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(
            path = %path.display(),
            columns = schema.columns.len(),
            "Loaded schema definition"
        );
        Ok(schema)
    }

    /// Parse and validate a schema from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawSchema = serde_yaml::from_str(content).map_err(|e| ConfigError::Malformed {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSchema) -> Result<Self, ConfigError> {
        let mut columns = Vec::with_capacity(raw.columns.len());
        for column in raw.columns {
            match column {
                RawColumn::Name(name) => columns.push(ColumnSchema { name, dtype: None }),
                RawColumn::Typed(map) => {
                    if map.len() != 1 {
                        return Err(ConfigError::invalid(format!(
                            "column entries must map exactly one name to a dtype, got {} entries",
                            map.len()
                        )));
                    }
                    for (name, dtype) in map {
                        columns.push(ColumnSchema {
                            name,
                            dtype: Some(ColumnType::from_dtype(&dtype)),
                        });
                    }
                }
            }
        }

        let schema = Self {
            columns,
            numerical_columns: raw.numerical_columns,
            categorical_columns: raw.categorical_columns,
            target_column: raw.target_column,
            drop_columns: raw.drop_columns,
            num_features: raw.num_features,
            mm_columns: raw.mm_columns,
        };
        schema.check_invariants()?;
        Ok(schema)
    }

    fn check_invariants(&self) -> Result<(), ConfigError> {
        let mut declared = HashSet::new();
        for column in &self.columns {
            if !declared.insert(column.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }

        let subsets = [
            ("numerical_columns", &self.numerical_columns),
            ("categorical_columns", &self.categorical_columns),
            ("drop_columns", &self.drop_columns),
            ("num_features", &self.num_features),
            ("mm_columns", &self.mm_columns),
        ];
        for (key, names) in subsets {
            if let Some(unknown) = names.iter().find(|n| !declared.contains(n.as_str())) {
                return Err(ConfigError::invalid(format!(
                    "{key} entry '{unknown}' is not a declared column"
                )));
            }
        }

        if let Some(both) = self
            .numerical_columns
            .iter()
            .find(|n| self.categorical_columns.contains(n))
        {
            return Err(ConfigError::invalid(format!(
                "column '{both}' is tagged both numerical and categorical"
            )));
        }

        if self.is_feature(&self.target_column) {
            return Err(ConfigError::invalid(format!(
                "target column '{}' must not be a feature column",
                self.target_column
            )));
        }
        Ok(())
    }

    /// Names of all expected columns, in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of expected columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether `name` is tagged numerical or categorical.
    pub fn is_feature(&self, name: &str) -> bool {
        self.numerical_columns.iter().any(|c| c == name)
            || self.categorical_columns.iter().any(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VEHICLE_SCHEMA: &str = r#"
columns:
  - id: int
  - Gender: category
  - Age: int
  - Annual_Premium: float
  - Vehicle_Damage: category
  - Response: int
numerical_columns:
  - Age
  - Annual_Premium
categorical_columns:
  - Gender
  - Vehicle_Damage
drop_columns:
  - id
num_features:
  - Age
mm_columns:
  - Annual_Premium
"#;

    #[test]
    fn test_parse_typed_columns() {
        let schema = SchemaDefinition::from_yaml_str(VEHICLE_SCHEMA).unwrap();
        assert_eq!(schema.column_count(), 6);
        assert_eq!(schema.columns[1].dtype, Some(ColumnType::Category));
        assert_eq!(schema.columns[3].dtype, Some(ColumnType::Float));
        assert_eq!(schema.target_column, "Response");
        assert_eq!(schema.drop_columns, vec!["id"]);
    }

    #[test]
    fn test_load_shipped_schema() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/schema.yaml");
        let schema = SchemaDefinition::load(&path).unwrap();
        assert_eq!(schema.column_count(), 12);
        assert_eq!(schema.target_column, "Response");
        assert_eq!(schema.categorical_columns, vec!["Gender", "Vehicle_Age", "Vehicle_Damage"]);
        assert!(!schema.is_feature("Response"));
    }

    #[test]
    fn test_parse_bare_names() {
        let schema = SchemaDefinition::from_yaml_str(
            "columns: [a, b, c]\nnumerical_columns: [a]\ncategorical_columns: [b]\n",
        )
        .unwrap();
        assert_eq!(schema.column_names(), vec!["a", "b", "c"]);
        assert_eq!(schema.columns[0].dtype, None);
    }

    #[test]
    fn test_missing_required_key() {
        let err = SchemaDefinition::from_yaml_str("columns: [a]\nnumerical_columns: [a]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(err.to_string().contains("categorical_columns"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SchemaDefinition::from_yaml_str(
            "columns: [a]\nnumerical_columns: []\ncategorical_columns: []\nextra: 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_feature_must_be_declared() {
        let err = SchemaDefinition::from_yaml_str(
            "columns: [a]\nnumerical_columns: [a, z]\ncategorical_columns: []\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("'z'"));
    }

    #[test]
    fn test_overlapping_partitions_rejected() {
        let err = SchemaDefinition::from_yaml_str(
            "columns: [a, b]\nnumerical_columns: [a]\ncategorical_columns: [a]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("both numerical and categorical"));
    }

    #[test]
    fn test_target_cannot_be_feature() {
        let err = SchemaDefinition::from_yaml_str(
            "columns: [a, y]\nnumerical_columns: [a, y]\ncategorical_columns: []\ntarget_column: y\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("target column 'y'"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SchemaDefinition::load(Path::new("/nonexistent/schema.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_reports_path_on_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, "columns: [unterminated").unwrap();
        match SchemaDefinition::load(&path).unwrap_err() {
            ConfigError::Malformed { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
