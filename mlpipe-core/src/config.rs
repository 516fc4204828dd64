//! Configuration for the pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `mlpipe.toml` -> explicit file -> `MLPIPE_*` environment.
//! Per-run stage configurations are derived from the loaded [`PipelineConfig`]
//! and a freshly created run directory.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Optional name prefixed to log records.
    #[serde(default)]
    pub pipeline_name: String,
    /// Root under which timestamped run directories are created.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Schema file consulted by the validation and transformation stages.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// Directory for the rolling JSON log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub trainer: TrainerSettings,
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: String::new(),
            artifact_dir: default_artifact_dir(),
            schema_path: default_schema_path(),
            log_dir: default_log_dir(),
            ingestion: IngestionSettings::default(),
            trainer: TrainerSettings::default(),
            evaluation: EvaluationSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(ARTIFACT_DIR)
}

fn default_schema_path() -> PathBuf {
    PathBuf::from(SCHEMA_FILE_PATH)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Ingestion stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionSettings {
    /// Collection (table) exported from the record source.
    #[serde(default = "default_collection")]
    pub collection_name: String,
    /// Fraction of rows held out as the test split.
    #[serde(default = "default_split_ratio")]
    pub train_test_split_ratio: f64,
    /// Seed for the split shuffle.
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            collection_name: default_collection(),
            train_test_split_ratio: default_split_ratio(),
            split_seed: default_split_seed(),
        }
    }
}

fn default_collection() -> String {
    COLLECTION_NAME.to_string()
}

fn default_split_ratio() -> f64 {
    DATA_INGESTION_TRAIN_TEST_SPLIT_RATIO
}

fn default_split_seed() -> u64 {
    42
}

/// Trainer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainerSettings {
    /// Minimum test accuracy a trained model must reach.
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// L2 regularisation strength.
    #[serde(default = "default_l2")]
    pub l2: f64,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            expected_score: default_expected_score(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2: default_l2(),
        }
    }
}

fn default_expected_score() -> f64 {
    MODEL_TRAINER_EXPECTED_SCORE
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_epochs() -> usize {
    300
}

fn default_l2() -> f64 {
    0.001
}

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationSettings {
    /// Minimum F1 improvement over production required to accept a model.
    #[serde(default = "default_changed_threshold")]
    pub changed_threshold: f64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            changed_threshold: default_changed_threshold(),
        }
    }
}

fn default_changed_threshold() -> f64 {
    MODEL_EVALUATION_CHANGED_THRESHOLD_SCORE
}

/// Which blob store implementation backs the storage gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Fs,
    Http,
}

/// Blob store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Local root for the `fs` backend; one directory per bucket.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base URL for the `http` backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket_name: String,
    /// Key of the promoted production model.
    #[serde(default = "default_model_key")]
    pub model_key: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_storage_root(),
            endpoint: None,
            bucket_name: default_bucket(),
            model_key: default_model_key(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Fs
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("blobstore")
}

fn default_bucket() -> String {
    MODEL_BUCKET_NAME.to_string()
}

fn default_model_key() -> String {
    format!("{MODEL_PUSHER_S3_KEY}/{MODEL_FILE_NAME}")
}

fn default_timeout_secs() -> u64 {
    60
}

impl PipelineConfig {
    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.ingestion.train_test_split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::invalid(format!(
                "ingestion.train_test_split_ratio must be in (0, 1), got {ratio}"
            )));
        }
        if !(0.0..=1.0).contains(&self.trainer.expected_score) {
            return Err(ConfigError::invalid(format!(
                "trainer.expected_score must be in [0, 1], got {}",
                self.trainer.expected_score
            )));
        }
        if self.trainer.learning_rate <= 0.0 || self.trainer.epochs == 0 {
            return Err(ConfigError::invalid(
                "trainer.learning_rate and trainer.epochs must be positive",
            ));
        }
        if self.trainer.l2 < 0.0 {
            return Err(ConfigError::invalid("trainer.l2 must not be negative"));
        }
        if self.evaluation.changed_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "evaluation.changed_threshold must not be negative",
            ));
        }
        if self.storage.bucket_name.trim().is_empty() || self.storage.model_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "storage.bucket_name and storage.model_key must be set",
            ));
        }
        if self.storage.backend == StorageBackend::Http && self.storage.endpoint.is_none() {
            return Err(ConfigError::invalid(
                "storage.endpoint is required for the http backend",
            ));
        }
        Ok(())
    }

    /// Resolve relative paths against `workspace`.
    pub fn resolve_paths(mut self, workspace: &Path) -> Self {
        for path in [
            &mut self.artifact_dir,
            &mut self.schema_path,
            &mut self.log_dir,
            &mut self.storage.root,
        ] {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        }
        self
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `MLPIPE_`, nested with `__`)
/// 2. Explicit config file (must exist)
/// 3. Workspace config (`mlpipe.toml`)
/// 4. User config (`~/.config/mlpipe/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<PipelineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "mlpipe", "mlpipe") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join("mlpipe.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // MLPIPE_ARTIFACT_DIR, MLPIPE_STORAGE__BUCKET_NAME, ...
    figment = figment.merge(Env::prefixed("MLPIPE_").split("__"));

    let config: PipelineConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

fn require_var<F>(lookup: &F, var: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::EnvVarNotSet {
            var: var.to_string(),
        })
}

/// Connection string for the record source, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub url: String,
}

impl DatabaseCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        Ok(Self {
            url: require_var(&lookup, DATABASE_URL_KEY)?,
        })
    }
}

/// Access credentials for the remote blob store.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl StorageCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        Ok(Self {
            access_key_id: require_var(&lookup, ACCESS_KEY_ID_KEY)?,
            secret_access_key: require_var(&lookup, SECRET_ACCESS_KEY_KEY)?,
        })
    }
}

/// One pipeline run: its name, timestamp and exclusive artifact directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPipelineConfig {
    pub pipeline_name: String,
    pub artifact_dir: PathBuf,
    pub timestamp: String,
}

impl TrainingPipelineConfig {
    /// Create a fresh run directory under `artifact_root`.
    ///
    /// The directory is named after `now`; if another run already owns that
    /// name a numeric suffix is appended, so concurrent runs never share a
    /// namespace.
    pub fn create(
        pipeline_name: &str,
        artifact_root: &Path,
        now: DateTime<Local>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(artifact_root)?;
        let timestamp = now.format(RUN_TIMESTAMP_FORMAT).to_string();
        let mut candidate = timestamp.clone();
        let mut attempt = 0u32;
        loop {
            let dir = artifact_root.join(&candidate);
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    return Ok(Self {
                        pipeline_name: pipeline_name.to_string(),
                        artifact_dir: dir,
                        timestamp: candidate,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                    candidate = format!("{timestamp}_{attempt}");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Paths for the ingestion stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionConfig {
    pub data_ingestion_dir: PathBuf,
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
    pub train_test_split_ratio: f64,
    pub split_seed: u64,
    pub collection_name: String,
}

impl DataIngestionConfig {
    pub fn new(run: &TrainingPipelineConfig, settings: &IngestionSettings) -> Self {
        let dir = run.artifact_dir.join(DATA_INGESTION_DIR_NAME);
        Self {
            feature_store_file_path: dir.join(DATA_INGESTION_FEATURE_STORE_DIR).join(FILE_NAME),
            training_file_path: dir.join(DATA_INGESTION_INGESTED_DIR).join(TRAIN_FILE_NAME),
            testing_file_path: dir.join(DATA_INGESTION_INGESTED_DIR).join(TEST_FILE_NAME),
            data_ingestion_dir: dir,
            train_test_split_ratio: settings.train_test_split_ratio,
            split_seed: settings.split_seed,
            collection_name: settings.collection_name.clone(),
        }
    }
}

/// Paths for the validation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValidationConfig {
    pub data_validation_dir: PathBuf,
    pub validation_report_file_path: PathBuf,
}

impl DataValidationConfig {
    pub fn new(run: &TrainingPipelineConfig) -> Self {
        let dir = run.artifact_dir.join(DATA_VALIDATION_DIR_NAME);
        Self {
            validation_report_file_path: dir.join(DATA_VALIDATION_REPORT_FILE_NAME),
            data_validation_dir: dir,
        }
    }

    /// A standalone validation config writing its report to `report_path`.
    pub fn with_report_path(report_path: impl Into<PathBuf>) -> Self {
        let validation_report_file_path = report_path.into();
        Self {
            data_validation_dir: validation_report_file_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            validation_report_file_path,
        }
    }
}

/// Paths for the transformation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTransformationConfig {
    pub data_transformation_dir: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub transformed_object_file_path: PathBuf,
}

impl DataTransformationConfig {
    pub fn new(run: &TrainingPipelineConfig) -> Self {
        let dir = run.artifact_dir.join(DATA_TRANSFORMATION_DIR_NAME);
        let data_dir = dir.join(DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR);
        Self {
            transformed_train_file_path: data_dir.join(TRAIN_FILE_NAME),
            transformed_test_file_path: data_dir.join(TEST_FILE_NAME),
            transformed_object_file_path: dir
                .join(DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR)
                .join(PREPROCESSING_OBJECT_FILE_NAME),
            data_transformation_dir: dir,
        }
    }
}

/// Paths and hyperparameters for the training stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTrainerConfig {
    pub model_trainer_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
    pub expected_accuracy: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

impl ModelTrainerConfig {
    pub fn new(run: &TrainingPipelineConfig, settings: &TrainerSettings) -> Self {
        let dir = run.artifact_dir.join(MODEL_TRAINER_DIR_NAME);
        Self {
            trained_model_file_path: dir
                .join(MODEL_TRAINER_TRAINED_MODEL_DIR)
                .join(MODEL_FILE_NAME),
            model_trainer_dir: dir,
            expected_accuracy: settings.expected_score,
            learning_rate: settings.learning_rate,
            epochs: settings.epochs,
            l2: settings.l2,
        }
    }
}

/// Settings for comparing a trained model with production.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvaluationConfig {
    pub changed_threshold_score: f64,
    pub bucket_name: String,
    pub s3_model_key_path: String,
}

impl ModelEvaluationConfig {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            changed_threshold_score: config.evaluation.changed_threshold,
            bucket_name: config.storage.bucket_name.clone(),
            s3_model_key_path: config.storage.model_key.clone(),
        }
    }
}

/// Destination of a promoted model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPusherConfig {
    pub bucket_name: String,
    pub s3_model_key_path: String,
    /// Lock file guarding promotion.
    pub lock_file_path: PathBuf,
}

impl ModelPusherConfig {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            bucket_name: config.storage.bucket_name.clone(),
            s3_model_key_path: config.storage.model_key.clone(),
            lock_file_path: config.artifact_dir.join(PROMOTION_LOCK_FILE_NAME),
        }
    }
}

/// Where prediction looks for models.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    pub artifact_root: PathBuf,
    /// Fixed path of the model file beneath each run directory.
    pub model_subpath: PathBuf,
    pub model_bucket_name: String,
    pub model_key: String,
}

impl PredictorConfig {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            artifact_root: config.artifact_dir.clone(),
            model_subpath: default_model_subpath(),
            model_bucket_name: config.storage.bucket_name.clone(),
            model_key: config.storage.model_key.clone(),
        }
    }
}

/// `model_trainer/model_trainer/model.pkl`
pub fn default_model_subpath() -> PathBuf {
    PathBuf::from(MODEL_TRAINER_DIR_NAME)
        .join(MODEL_TRAINER_TRAINED_MODEL_DIR)
        .join(MODEL_FILE_NAME)
}
