//! The trained model artifact: preprocessing + estimator + target mapping.
//!
//! Models are stored as a versioned JSON envelope. Loading checks the format
//! tag and version before deserializing the body, so a foreign or future
//! artifact is reported as such instead of producing a half-valid model.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::table::Table;
use crate::data::transform::{Preprocessor, TargetValueMapping};
use crate::error::ModelError;
use crate::persistence;
use crate::training::estimator::EstimatorDescriptor;

pub const MODEL_FORMAT: &str = "mlpipe-model";
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// On-disk representation of a [`TrainedModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEnvelope {
    pub format: String,
    pub format_version: u32,
    pub target_mapping: TargetValueMapping,
    pub preprocessor: Preprocessor,
    pub estimator: EstimatorDescriptor,
}

/// A fitted model that preprocesses raw feature tables before predicting.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    preprocessor: Preprocessor,
    estimator: EstimatorDescriptor,
    target_mapping: TargetValueMapping,
}

impl TrainedModel {
    pub fn new(preprocessor: Preprocessor, estimator: EstimatorDescriptor) -> Self {
        Self {
            preprocessor,
            estimator,
            target_mapping: TargetValueMapping::default(),
        }
    }

    /// Class codes for every row of a raw feature table.
    pub fn predict(&self, table: &Table) -> Result<Vec<i64>, ModelError> {
        let features = self.preprocessor.transform(table)?;
        self.estimator.as_estimator().predict(&features)
    }

    /// Predictions decoded to their labels (`yes` / `no`).
    pub fn predict_labels(&self, table: &Table) -> Result<Vec<String>, ModelError> {
        self.predict(table)?
            .into_iter()
            .map(|code| {
                self.target_mapping
                    .decode(code)
                    .map(str::to_string)
                    .ok_or_else(|| ModelError::prediction(format!("unknown class code {code}")))
            })
            .collect()
    }

    pub fn to_envelope(&self) -> ModelEnvelope {
        ModelEnvelope {
            format: MODEL_FORMAT.to_string(),
            format_version: MODEL_FORMAT_VERSION,
            target_mapping: self.target_mapping,
            preprocessor: self.preprocessor.clone(),
            estimator: self.estimator.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec_pretty(&self.to_envelope())
            .map_err(|e| ModelError::deserialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| ModelError::deserialization(format!("not a model envelope: {e}")))?;

        let format = value.get("format").and_then(|f| f.as_str()).unwrap_or("");
        if format != MODEL_FORMAT {
            return Err(ModelError::UnsupportedFormat {
                found: if format.is_empty() {
                    "<missing>".to_string()
                } else {
                    format.to_string()
                },
            });
        }
        let version = value
            .get("format_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ModelError::deserialization("format_version is missing"))?;
        if version != u64::from(MODEL_FORMAT_VERSION) {
            return Err(ModelError::UnsupportedVersion {
                found: u32::try_from(version).unwrap_or(u32::MAX),
                supported: MODEL_FORMAT_VERSION,
            });
        }

        let envelope: ModelEnvelope = serde_json::from_value(value)
            .map_err(|e| ModelError::deserialization(e.to_string()))?;
        Ok(Self {
            preprocessor: envelope.preprocessor,
            estimator: envelope.estimator,
            target_mapping: envelope.target_mapping,
        })
    }

    /// Atomically write the envelope to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = self.to_bytes()?;
        persistence::atomic_write(path, &bytes).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.estimator.as_estimator().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaDefinition;
    use crate::training::estimator::{Estimator, LogisticRegression};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fitted() -> (TrainedModel, Table) {
        let schema = SchemaDefinition::from_yaml_str(
            "columns: [Age, Vehicle_Damage, Response]\n\
             numerical_columns: [Age]\n\
             categorical_columns: [Vehicle_Damage]\n\
             num_features: [Age]\n",
        )
        .unwrap();
        let table = Table::new(
            vec!["Age".into(), "Vehicle_Damage".into()],
            vec![
                vec![json!(22), json!("No")],
                vec![json!(25), json!("No")],
                vec![json!(51), json!("Yes")],
                vec![json!(60), json!("Yes")],
            ],
        );
        let preprocessor = Preprocessor::fit(&table, &schema).unwrap();
        let features = preprocessor.transform(&table).unwrap();
        let mut estimator = LogisticRegression::new(0.5, 400, 0.0);
        estimator.fit(&features, &[0.0, 0.0, 1.0, 1.0]).unwrap();
        (
            TrainedModel::new(preprocessor, EstimatorDescriptor::LogisticRegression(estimator)),
            table,
        )
    }

    #[test]
    fn test_predict_applies_preprocessing() {
        let (model, table) = fitted();
        assert_eq!(model.predict(&table).unwrap(), vec![0, 0, 1, 1]);
        assert_eq!(
            model.predict_labels(&table).unwrap(),
            vec!["yes", "yes", "no", "no"]
        );
    }

    #[test]
    fn test_bytes_round_trip() {
        let (model, table) = fitted();
        let restored = TrainedModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, model);
        assert_eq!(restored.predict(&table).unwrap(), model.predict(&table).unwrap());
    }

    #[test]
    fn test_display_names_estimator() {
        let (model, _) = fitted();
        assert_eq!(model.to_string(), "LogisticRegression()");
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        let err = TrainedModel::from_bytes(b"\x80\x04\x95pickle").unwrap_err();
        assert!(matches!(err, ModelError::Deserialization { .. }));

        let err = TrainedModel::from_bytes(br#"{"format":"other"}"#).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFormat { found } if found == "other"));
    }

    #[test]
    fn test_rejects_future_version() {
        let (model, _) = fitted();
        let mut value = serde_json::to_value(model.to_envelope()).unwrap();
        value["format_version"] = json!(2);
        let err = TrainedModel::from_bytes(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnsupportedVersion {
                found: 2,
                supported: 1
            }
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model_trainer/model.pkl");
        let (model, _) = fitted();
        model.save(&path).unwrap();
        assert_eq!(TrainedModel::load(&path).unwrap(), model);
    }
}
