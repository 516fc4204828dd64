//! Typed results threaded between pipeline stages.
//!
//! Each stage consumes the previous stage's artifact by value and returns its
//! own. Artifacts are plain values: nothing is shared or mutated across stages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw train/test files produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub trained_file_path: PathBuf,
    pub test_file_path: PathBuf,
}

/// Outcome of the schema gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    pub validation_status: bool,
    pub validation_report_file_path: PathBuf,
    pub message: String,
}

/// Fitted preprocessing object plus transformed train/test arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

/// Binary classification scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationMetricArtifact {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
    pub accuracy: f64,
}

/// A trained model written to the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub metric_artifact: ClassificationMetricArtifact,
}

/// Comparison of the trained model against the production baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationArtifact {
    pub is_model_accepted: bool,
    /// New F1 minus the production F1 (production counts as 0 when absent).
    pub changed_accuracy: f64,
    pub s3_model_path: String,
    pub trained_model_path: PathBuf,
}

/// Where a promoted model now lives in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPusherArtifact {
    pub bucket_name: String,
    pub s3_model_path: String,
}
