//! # mlpipe core
//!
//! Batch binary-classification training pipeline with a schema-driven
//! validation gate, timestamped run artifacts and promotion to a blob store.
//!
//! - [`data`]: schema registry, tables, record sources, ingestion, validation, transformation
//! - [`training`]: estimators, metrics, the versioned model artifact and the trainer stage
//! - [`eval`]: comparison of a trained model with the production model
//! - [`promotion`]: lock-guarded upload of accepted models
//! - [`storage`]: blob store backends and the storage gateway
//! - [`inference`]: latest-model resolution and prediction
//! - [`pipeline`]: the orchestrator running every stage in order

pub mod artifact;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod eval;
pub mod inference;
pub mod persistence;
pub mod pipeline;
pub mod promotion;
pub mod storage;
pub mod training;

pub use artifact::*;
pub use config::{PipelineConfig, load_config};
pub use data::{SchemaDefinition, Table};
pub use error::{
    ArtifactNotFoundError, ConfigError, ModelError, PipelineError, StorageError, TableError,
    ValidationRunError,
};
pub use inference::{PredictionRequest, PredictionService, resolve_latest_model};
pub use pipeline::{PipelineOutcome, PipelineRun, TrainingPipeline};
pub use storage::StorageGateway;
pub use training::TrainedModel;
