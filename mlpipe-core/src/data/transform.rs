//! Feature preprocessing and the data transformation stage.
//!
//! A [`Preprocessor`] is fitted on the training split only and then applied
//! unchanged to the test split and, later, to prediction inputs. It is stored
//! as JSON next to the transformed arrays and embedded in the model envelope.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::{DataIngestionArtifact, DataTransformationArtifact, DataValidationArtifact};
use crate::config::DataTransformationConfig;
use crate::data::schema::SchemaDefinition;
use crate::data::table::{Table, value_as_category, value_as_f64};
use crate::error::{ModelError, PipelineError};
use crate::persistence;

/// Fitted per-column transform. Output feature order is the order of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// `(x - mean) / std`; nulls become the mean.
    StandardScale { column: String, mean: f64, std: f64 },
    /// `(x - min) / (max - min)`; nulls become `min`.
    MinMaxScale { column: String, min: f64, max: f64 },
    /// Index into the sorted distinct training values; unseen values map to -1.
    LabelEncode { column: String, classes: Vec<String> },
    /// Numeric value as-is; nulls become `fill`.
    Passthrough { column: String, fill: f64 },
}

impl ColumnTransform {
    pub fn column(&self) -> &str {
        match self {
            Self::StandardScale { column, .. }
            | Self::MinMaxScale { column, .. }
            | Self::LabelEncode { column, .. }
            | Self::Passthrough { column, .. } => column,
        }
    }

    fn apply(&self, value: &Value) -> Result<f64, String> {
        let numeric = |fill: f64| -> Result<f64, String> {
            if value.is_null() {
                return Ok(fill);
            }
            value_as_f64(value)
                .ok_or_else(|| format!("non-numeric value {value} in column {}", self.column()))
        };
        match self {
            Self::StandardScale { mean, std, .. } => Ok((numeric(*mean)? - mean) / std),
            Self::MinMaxScale { min, max, .. } => {
                let range = if max > min { max - min } else { 1.0 };
                Ok((numeric(*min)? - min) / range)
            }
            Self::LabelEncode { classes, .. } => {
                let key = value_as_category(value);
                Ok(classes
                    .binary_search(&key)
                    .map(|i| i as f64)
                    .unwrap_or(-1.0))
            }
            Self::Passthrough { fill, .. } => numeric(*fill),
        }
    }
}

/// Column-wise preprocessing fitted on training features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub drop_columns: Vec<String>,
    pub transforms: Vec<ColumnTransform>,
}

impl Preprocessor {
    /// Fit on `features`, which must not contain the target column.
    ///
    /// Declared categorical columns and any column holding non-numeric
    /// values are label-encoded.
    pub fn fit(features: &Table, schema: &SchemaDefinition) -> Result<Self, ModelError> {
        let mut transforms = Vec::new();
        for column in &features.columns {
            if schema.drop_columns.contains(column) {
                continue;
            }
            let values = features
                .column_values(column)
                .map_err(|e| ModelError::prediction(e.to_string()))?;
            let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
            let numbers: Option<Vec<f64>> = non_null.iter().map(|v| value_as_f64(v)).collect();

            let transform = match numbers {
                Some(nums) if !schema.categorical_columns.contains(column) => {
                    if schema.mm_columns.contains(column) {
                        let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
                        let max = nums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        let (min, max) = if nums.is_empty() { (0.0, 1.0) } else { (min, max) };
                        ColumnTransform::MinMaxScale {
                            column: column.clone(),
                            min,
                            max,
                        }
                    } else if schema.num_features.contains(column) {
                        let (mean, std) = mean_std(&nums);
                        ColumnTransform::StandardScale {
                            column: column.clone(),
                            mean,
                            std,
                        }
                    } else {
                        ColumnTransform::Passthrough {
                            column: column.clone(),
                            fill: mean_std(&nums).0,
                        }
                    }
                }
                _ => {
                    let classes: BTreeSet<String> =
                        values.iter().map(|v| value_as_category(v)).collect();
                    ColumnTransform::LabelEncode {
                        column: column.clone(),
                        classes: classes.into_iter().collect(),
                    }
                }
            };
            transforms.push(transform);
        }
        Ok(Self {
            drop_columns: schema.drop_columns.clone(),
            transforms,
        })
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.transforms.iter().map(ColumnTransform::column).collect()
    }

    /// Transform every row of `table`. Extra columns (including the target) are ignored.
    pub fn transform(&self, table: &Table) -> Result<Vec<Vec<f64>>, ModelError> {
        let indices = self
            .transforms
            .iter()
            .map(|t| {
                table.column_index(t.column()).ok_or_else(|| {
                    ModelError::prediction(format!("missing feature column {}", t.column()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        table
            .rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                self.transforms
                    .iter()
                    .zip(&indices)
                    .map(|(t, &i)| {
                        t.apply(row.get(i).unwrap_or(&Value::Null))
                            .map_err(|msg| ModelError::prediction(format!("row {row_idx}: {msg}")))
                    })
                    .collect()
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        persistence::atomic_write_json(path, self).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        persistence::load_json(path)
            .map_err(|source| ModelError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| {
                ModelError::deserialization(format!(
                    "preprocessing object not found: {}",
                    path.display()
                ))
            })
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > 0.0 { std } else { 1.0 })
}

/// Encoding of the binary target. `yes` is class 0 and `no` is class 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetValueMapping {
    pub yes: i64,
    pub no: i64,
}

impl Default for TargetValueMapping {
    fn default() -> Self {
        Self { yes: 0, no: 1 }
    }
}

impl TargetValueMapping {
    /// Class code of a raw target value. Numeric 0/1 pass through.
    pub fn encode(&self, value: &Value) -> Option<i64> {
        match value {
            Value::String(s) if s.eq_ignore_ascii_case("yes") => Some(self.yes),
            Value::String(s) if s.eq_ignore_ascii_case("no") => Some(self.no),
            other => value_as_f64(other).and_then(|f| {
                if f == 0.0 {
                    Some(0)
                } else if f == 1.0 {
                    Some(1)
                } else {
                    None
                }
            }),
        }
    }

    /// Label of a class code.
    pub fn decode(&self, code: i64) -> Option<&'static str> {
        if code == self.yes {
            Some("yes")
        } else if code == self.no {
            Some("no")
        } else {
            None
        }
    }

    /// Encode a whole target column, naming the first bad row on failure.
    pub fn encode_column(&self, values: &[&Value]) -> Result<Vec<i64>, String> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                self.encode(v)
                    .ok_or_else(|| format!("row {i}: target value {v} is not a binary label"))
            })
            .collect()
    }
}

/// Feature matrix with its target column, as written by the transformation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedData {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TransformedData {
    /// Write as CSV with the target as the last column.
    pub fn write(&self, path: &Path, target_column: &str) -> Result<(), PipelineError> {
        let mut columns = self.feature_names.clone();
        columns.push(target_column.to_string());
        let mut table = Table::with_columns(&columns);
        for (row, target) in self.features.iter().zip(&self.targets) {
            let mut cells: Vec<Value> = row.iter().map(|x| number(*x)).collect();
            cells.push(number(*target));
            table.push_row(cells);
        }
        Ok(table.write_csv(path)?)
    }

    pub fn read(path: &Path) -> Result<Self, PipelineError> {
        let table = Table::read_csv(path)?;
        let Some((_, feature_names)) = table.columns.split_last() else {
            return Err(PipelineError::training(format!(
                "transformed array {} has no columns",
                path.display()
            )));
        };
        let mut features = Vec::with_capacity(table.row_count());
        let mut targets = Vec::with_capacity(table.row_count());
        for (i, row) in table.rows.iter().enumerate() {
            let parsed: Option<Vec<f64>> = row.iter().map(value_as_f64).collect();
            let Some(mut values) = parsed.filter(|v| v.len() == table.column_count()) else {
                return Err(PipelineError::training(format!(
                    "transformed array {} has a malformed row {i}",
                    path.display()
                )));
            };
            targets.push(values.pop().unwrap_or_default());
            features.push(values);
        }
        Ok(Self {
            feature_names: feature_names.to_vec(),
            features,
            targets,
        })
    }
}

fn number(x: f64) -> Value {
    serde_json::Number::from_f64(x)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// The data transformation stage.
pub struct DataTransformation {
    config: DataTransformationConfig,
    schema: SchemaDefinition,
    target_mapping: TargetValueMapping,
}

impl DataTransformation {
    pub fn new(config: DataTransformationConfig, schema: SchemaDefinition) -> Self {
        Self {
            config,
            schema,
            target_mapping: TargetValueMapping::default(),
        }
    }

    pub fn run(
        &self,
        ingestion: &DataIngestionArtifact,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact, PipelineError> {
        tracing::info!("Starting data transformation");
        if !validation.validation_status {
            return Err(PipelineError::transformation(validation.message.clone()));
        }

        let train = Table::read_csv(&ingestion.trained_file_path)?;
        let test = Table::read_csv(&ingestion.test_file_path)?;
        let target = self.schema.target_column.as_str();

        let (train_features, train_targets) = self.split_target(&train)?;
        let (test_features, test_targets) = self.split_target(&test)?;

        let preprocessor = Preprocessor::fit(&train_features, &self.schema)
            .map_err(|e| PipelineError::transformation(e.to_string()))?;
        let feature_names: Vec<String> = preprocessor
            .feature_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        tracing::debug!(features = ?feature_names, "Preprocessor fitted on training features");

        let transform = |features: &Table, targets: Vec<f64>| {
            preprocessor
                .transform(features)
                .map(|features| TransformedData {
                    feature_names: feature_names.clone(),
                    features,
                    targets,
                })
                .map_err(|e| PipelineError::transformation(e.to_string()))
        };
        let train_data = transform(&train_features, train_targets)?;
        let test_data = transform(&test_features, test_targets)?;

        train_data.write(&self.config.transformed_train_file_path, target)?;
        test_data.write(&self.config.transformed_test_file_path, target)?;
        preprocessor.save(&self.config.transformed_object_file_path)?;

        tracing::info!(
            train_rows = train_data.features.len(),
            test_rows = test_data.features.len(),
            "Data transformation artifact created"
        );
        Ok(DataTransformationArtifact {
            transformed_object_file_path: self.config.transformed_object_file_path.clone(),
            transformed_train_file_path: self.config.transformed_train_file_path.clone(),
            transformed_test_file_path: self.config.transformed_test_file_path.clone(),
        })
    }

    fn split_target(&self, table: &Table) -> Result<(Table, Vec<f64>), PipelineError> {
        let target = self.schema.target_column.as_str();
        let values = table
            .column_values(target)
            .map_err(|_| PipelineError::transformation(format!("target column {target} is missing")))?;
        let encoded = self
            .target_mapping
            .encode_column(&values)
            .map_err(PipelineError::transformation)?;
        Ok((
            table.drop_columns(&[target]),
            encoded.into_iter().map(|c| c as f64).collect(),
        ))
    }
}
