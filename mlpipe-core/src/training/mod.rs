//! Estimators, metrics, the model artifact and the training stage.

pub mod estimator;
pub mod metrics;
pub mod model;
pub mod trainer;

pub use estimator::{Estimator, EstimatorDescriptor, LogisticRegression};
pub use metrics::classification_metrics;
pub use model::{MODEL_FORMAT, MODEL_FORMAT_VERSION, ModelEnvelope, TrainedModel};
pub use trainer::ModelTrainer;
