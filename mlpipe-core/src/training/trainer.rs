//! The model training stage.

use crate::artifact::{DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::ModelTrainerConfig;
use crate::data::transform::{Preprocessor, TransformedData};
use crate::error::PipelineError;
use crate::training::estimator::{Estimator, EstimatorDescriptor, LogisticRegression};
use crate::training::metrics::classification_metrics;
use crate::training::model::TrainedModel;

pub struct ModelTrainer {
    config: ModelTrainerConfig,
}

impl ModelTrainer {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self { config }
    }

    /// Fit on the transformed training array and score on the test array.
    ///
    /// Fails when test accuracy is below the configured expected score; no
    /// model file is written in that case.
    pub fn run(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, PipelineError> {
        tracing::info!("Starting model training");
        let train = TransformedData::read(&transformation.transformed_train_file_path)?;
        let test = TransformedData::read(&transformation.transformed_test_file_path)?;
        if train.feature_names != test.feature_names {
            return Err(PipelineError::training(
                "train and test arrays have different feature columns",
            ));
        }

        let mut estimator =
            LogisticRegression::new(self.config.learning_rate, self.config.epochs, self.config.l2);
        estimator.fit(&train.features, &train.targets)?;
        tracing::debug!(
            epochs = self.config.epochs,
            features = train.feature_names.len(),
            "Estimator fitted"
        );

        let predicted = estimator.predict(&test.features)?;
        let actual: Vec<i64> = test.targets.iter().map(|t| *t as i64).collect();
        let metrics = classification_metrics(&actual, &predicted);
        tracing::info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            precision = metrics.precision_score,
            recall = metrics.recall_score,
            "Model scored on test split"
        );

        if metrics.accuracy < self.config.expected_accuracy {
            return Err(PipelineError::training(format!(
                "No model found with score above the base score: accuracy {:.4} < expected {:.4}",
                metrics.accuracy, self.config.expected_accuracy
            )));
        }

        let preprocessor = Preprocessor::load(&transformation.transformed_object_file_path)?;
        let model = TrainedModel::new(
            preprocessor,
            EstimatorDescriptor::LogisticRegression(estimator),
        );
        model.save(&self.config.trained_model_file_path)?;
        tracing::info!(
            model = %model,
            path = %self.config.trained_model_file_path.display(),
            "Trained model saved"
        );

        Ok(ModelTrainerArtifact {
            trained_model_file_path: self.config.trained_model_file_path.clone(),
            metric_artifact: metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transform::ColumnTransform;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_arrays(dir: &Path) -> DataTransformationArtifact {
        let train = TransformedData {
            feature_names: vec!["x".into()],
            features: vec![vec![-2.0], vec![-1.0], vec![1.0], vec![2.0]],
            targets: vec![0.0, 0.0, 1.0, 1.0],
        };
        let test = TransformedData {
            feature_names: vec!["x".into()],
            features: vec![vec![-1.5], vec![1.5]],
            targets: vec![0.0, 1.0],
        };
        train.write(&dir.join("train.csv"), "Response").unwrap();
        test.write(&dir.join("test.csv"), "Response").unwrap();
        let preprocessor = Preprocessor {
            drop_columns: vec![],
            transforms: vec![ColumnTransform::Passthrough {
                column: "x".into(),
                fill: 0.0,
            }],
        };
        preprocessor.save(&dir.join("preprocessing.pkl")).unwrap();
        DataTransformationArtifact {
            transformed_object_file_path: dir.join("preprocessing.pkl"),
            transformed_train_file_path: dir.join("train.csv"),
            transformed_test_file_path: dir.join("test.csv"),
        }
    }

    fn config(dir: &Path, expected_accuracy: f64) -> ModelTrainerConfig {
        ModelTrainerConfig {
            model_trainer_dir: dir.join("model_trainer"),
            trained_model_file_path: dir.join("model_trainer/model_trainer/model.pkl"),
            expected_accuracy,
            learning_rate: 0.5,
            epochs: 200,
            l2: 0.0,
        }
    }

    #[test]
    fn test_trains_and_saves_model() {
        let dir = TempDir::new().unwrap();
        let artifact = write_arrays(dir.path());
        let result = ModelTrainer::new(config(dir.path(), 0.6)).run(&artifact).unwrap();
        assert_eq!(result.metric_artifact.accuracy, 1.0);
        let model = TrainedModel::load(&result.trained_model_file_path).unwrap();
        assert_eq!(model.to_string(), "LogisticRegression()");
    }

    #[test]
    fn test_rejects_below_expected_score() {
        let dir = TempDir::new().unwrap();
        let artifact = write_arrays(dir.path());
        let cfg = config(dir.path(), 1.1);
        let err = ModelTrainer::new(cfg.clone()).run(&artifact).unwrap_err();
        assert!(matches!(err, PipelineError::Training { .. }));
        assert!(!cfg.trained_model_file_path.exists());
    }
}
