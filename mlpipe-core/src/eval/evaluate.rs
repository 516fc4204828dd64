//! The model evaluation stage: trained model vs. production model.

use crate::artifact::{DataIngestionArtifact, ModelEvaluationArtifact, ModelTrainerArtifact};
use crate::config::ModelEvaluationConfig;
use crate::data::table::Table;
use crate::data::transform::TargetValueMapping;
use crate::error::PipelineError;
use crate::inference::RemoteEstimator;
use crate::storage::StorageGateway;
use crate::training::metrics::classification_metrics;

/// Scores of the two candidates on the held-out test table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluateModelResponse {
    pub trained_model_f1_score: f64,
    /// `None` when no production model exists.
    pub best_model_f1_score: Option<f64>,
    pub is_model_accepted: bool,
    pub difference: f64,
}

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    gateway: StorageGateway,
    target_column: String,
}

impl ModelEvaluation {
    pub fn new(
        config: ModelEvaluationConfig,
        gateway: StorageGateway,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            config,
            gateway,
            target_column: target_column.into(),
        }
    }

    /// F1 of the production model on `test`, or `None` if there is no production model.
    pub fn best_model_score(
        &self,
        test: &Table,
        actual: &[i64],
    ) -> Result<Option<f64>, PipelineError> {
        let mut production =
            RemoteEstimator::new(self.gateway.clone(), &self.config.s3_model_key_path);
        if !production.is_model_present()? {
            tracing::info!(key = %self.config.s3_model_key_path, "No production model found");
            return Ok(None);
        }
        let predicted = production.predict(test)?;
        Ok(Some(classification_metrics(actual, &predicted).f1_score))
    }

    pub fn evaluate_model(
        &self,
        ingestion: &DataIngestionArtifact,
        trainer: &ModelTrainerArtifact,
    ) -> Result<EvaluateModelResponse, PipelineError> {
        let table = Table::read_csv(&ingestion.test_file_path)?;
        let targets = table
            .column_values(&self.target_column)
            .map_err(|e| PipelineError::evaluation(e.to_string()))?;
        let actual = TargetValueMapping::default()
            .encode_column(&targets)
            .map_err(PipelineError::evaluation)?;
        let features = table.drop_columns(&[&self.target_column]);

        let trained = trainer.metric_artifact.f1_score;
        let best = self.best_model_score(&features, &actual)?;
        let difference = trained - best.unwrap_or(0.0);
        Ok(EvaluateModelResponse {
            trained_model_f1_score: trained,
            best_model_f1_score: best,
            is_model_accepted: difference > self.config.changed_threshold_score,
            difference,
        })
    }

    pub fn run(
        &self,
        ingestion: &DataIngestionArtifact,
        trainer: &ModelTrainerArtifact,
    ) -> Result<ModelEvaluationArtifact, PipelineError> {
        tracing::info!("Starting model evaluation");
        let response = self.evaluate_model(ingestion, trainer)?;
        tracing::info!(
            trained_f1 = response.trained_model_f1_score,
            production_f1 = ?response.best_model_f1_score,
            difference = response.difference,
            threshold = self.config.changed_threshold_score,
            accepted = response.is_model_accepted,
            "Model evaluation finished"
        );
        Ok(ModelEvaluationArtifact {
            is_model_accepted: response.is_model_accepted,
            changed_accuracy: response.difference,
            s3_model_path: self.config.s3_model_key_path.clone(),
            trained_model_path: trainer.trained_model_file_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ClassificationMetricArtifact;
    use crate::data::transform::{ColumnTransform, Preprocessor};
    use crate::storage::{BlobStore, MemoryBlobStore};
    use crate::training::estimator::{EstimatorDescriptor, LogisticRegression};
    use crate::training::model::TrainedModel;
    use std::path::Path;
    use std::sync::Arc;

    fn threshold_model() -> TrainedModel {
        let preprocessor = Preprocessor {
            drop_columns: vec![],
            transforms: vec![ColumnTransform::Passthrough {
                column: "x".into(),
                fill: 0.0,
            }],
        };
        let mut estimator = LogisticRegression::default();
        estimator.weights = vec![1.0];
        TrainedModel::new(preprocessor, EstimatorDescriptor::LogisticRegression(estimator))
    }

    fn fixtures(dir: &Path, trained_f1: f64) -> (DataIngestionArtifact, ModelTrainerArtifact) {
        let test = dir.join("test.csv");
        std::fs::write(&test, "x,Response\n-2,0\n-1,0\n1,1\n2,1\n").unwrap();
        let ingestion = DataIngestionArtifact {
            trained_file_path: dir.join("train.csv"),
            test_file_path: test,
        };
        let trainer = ModelTrainerArtifact {
            trained_model_file_path: dir.join("model.pkl"),
            metric_artifact: ClassificationMetricArtifact {
                f1_score: trained_f1,
                ..Default::default()
            },
        };
        (ingestion, trainer)
    }

    fn evaluation(store: Arc<MemoryBlobStore>) -> ModelEvaluation {
        ModelEvaluation::new(
            ModelEvaluationConfig {
                changed_threshold_score: 0.02,
                bucket_name: "bucket".into(),
                s3_model_key_path: "model-registry/model.pkl".into(),
            },
            StorageGateway::new(store, "bucket"),
            "Response",
        )
    }

    #[test]
    fn test_accepts_without_production_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ingestion, trainer) = fixtures(dir.path(), 0.7);
        let artifact = evaluation(Arc::new(MemoryBlobStore::new()))
            .run(&ingestion, &trainer)
            .unwrap();
        assert!(artifact.is_model_accepted);
        assert!((artifact.changed_accuracy - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_when_production_is_better() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ingestion, trainer) = fixtures(dir.path(), 0.9);
        let store = Arc::new(MemoryBlobStore::new());
        store
            .put("model-registry/model.pkl", &threshold_model().to_bytes().unwrap())
            .unwrap();
        let response = evaluation(store).evaluate_model(&ingestion, &trainer).unwrap();
        assert_eq!(response.best_model_f1_score, Some(1.0));
        assert!(!response.is_model_accepted);
        assert!((response.difference + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_improvement_must_exceed_threshold() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ingestion, trainer) = fixtures(dir.path(), 0.01);
        let artifact = evaluation(Arc::new(MemoryBlobStore::new()))
            .run(&ingestion, &trainer)
            .unwrap();
        assert!(!artifact.is_model_accepted);
    }
}
