//! Batch and single-record prediction with resolved or remote models.

use std::path::PathBuf;

use serde_json::Value;

use crate::config::PredictorConfig;
use crate::data::table::Table;
use crate::error::{ArtifactNotFoundError, ModelError, PipelineError};
use crate::inference::resolve::resolve_latest_model;
use crate::storage::StorageGateway;
use crate::training::model::TrainedModel;

/// One record of named feature values, built field by field.
///
/// ```
/// use mlpipe_core::inference::PredictionRequest;
///
/// let table = PredictionRequest::new()
///     .with("Gender", "Male")
///     .with("Age", 44)
///     .with("Vehicle_Damage", "Yes")
///     .to_table();
/// assert_eq!(table.row_count(), 1);
/// assert_eq!(table.columns, vec!["Gender", "Age", "Vehicle_Damage"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionRequest {
    fields: Vec<(String, Value)>,
}

impl PredictionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; setting the same name twice keeps the last value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// A one-row table with the fields in insertion order.
    pub fn to_table(&self) -> Table {
        let (columns, row): (Vec<String>, Vec<Value>) = self.fields.iter().cloned().unzip();
        Table::new(columns, vec![row])
    }
}

/// Predicts with the newest model found under the local artifact root.
pub struct PredictionService {
    config: PredictorConfig,
}

impl PredictionService {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn latest_model_path(&self) -> Result<PathBuf, ArtifactNotFoundError> {
        resolve_latest_model(&self.config.artifact_root, &self.config.model_subpath)
    }

    pub fn load_latest(&self) -> Result<TrainedModel, PipelineError> {
        let path = self.latest_model_path()?;
        let model = TrainedModel::load(&path)?;
        tracing::info!(path = %path.display(), model = %model, "Loaded latest model");
        Ok(model)
    }

    /// Decoded labels for every row of `table`.
    pub fn predict(&self, table: &Table) -> Result<Vec<String>, PipelineError> {
        let model = self.load_latest()?;
        Ok(model.predict_labels(table)?)
    }

    pub fn predict_one(&self, request: &PredictionRequest) -> Result<String, PipelineError> {
        self.predict(&request.to_table())?
            .pop()
            .ok_or_else(|| ModelError::prediction("model returned no prediction").into())
    }
}

/// The production model held in the blob store, loaded on first use.
pub struct RemoteEstimator {
    gateway: StorageGateway,
    model_key: String,
    loaded: Option<TrainedModel>,
}

impl RemoteEstimator {
    pub fn new(gateway: StorageGateway, model_key: impl Into<String>) -> Self {
        Self {
            gateway,
            model_key: model_key.into(),
            loaded: None,
        }
    }

    pub fn is_model_present(&self) -> Result<bool, PipelineError> {
        Ok(self.gateway.exists(&self.model_key)?)
    }

    pub fn load_model(&mut self) -> Result<&TrainedModel, PipelineError> {
        let model = match self.loaded.take() {
            Some(model) => model,
            None => self.gateway.load_model(&self.model_key)?,
        };
        Ok(&*self.loaded.insert(model))
    }

    /// Class codes from the production model.
    pub fn predict(&mut self, table: &Table) -> Result<Vec<i64>, PipelineError> {
        Ok(self.load_model()?.predict(table)?)
    }
}
