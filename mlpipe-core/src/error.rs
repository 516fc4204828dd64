//! Error types for the mlpipe core library.
//!
//! Each concern has its own `thiserror` enum; `PipelineError` aggregates them
//! so the orchestrator can propagate any stage failure with its full cause chain.

use std::path::PathBuf;

use crate::data::validate::ValidationStage;

/// Top-level error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation run failed: {0}")]
    Validation(#[from] ValidationRunError),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(#[from] ArtifactNotFoundError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Record source error: {message}")]
    Source { message: String },

    #[error("Data ingestion failed: {message}")]
    Ingestion { message: String },

    #[error("Data transformation failed: {message}")]
    Transformation { message: String },

    #[error("Model training failed: {message}")]
    Training { message: String },

    #[error("Model evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("Promotion is locked by another run: {path}")]
    PromotionLocked { path: PathBuf },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::Ingestion {
            message: message.into(),
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        Self::Transformation {
            message: message.into(),
        }
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::Training {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Missing or malformed configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Malformed configuration in {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarNotSet { var: String },

    #[error("Failed to load layered configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Failure while executing a validation run. No report is written when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ValidationRunError {
    #[error("{stage}: failed to load table {path}: {source}")]
    LoadTable {
        stage: ValidationStage,
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("{stage}: failed to serialize validation report: {source}")]
    Serialize {
        stage: ValidationStage,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{stage}: failed to write validation report {path}: {source}")]
    WriteReport {
        stage: ValidationStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidationRunError {
    /// The validation stage that was executing when the run failed.
    pub fn stage(&self) -> ValidationStage {
        match self {
            Self::LoadTable { stage, .. }
            | Self::Serialize { stage, .. }
            | Self::WriteReport { stage, .. } => *stage,
        }
    }
}

/// No promotable model could be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactNotFoundError {
    #[error("artifact root {root} could not be read: {source}")]
    RootUnreadable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no timestamped run directories under {root}")]
    NoRunDirectories { root: PathBuf },

    #[error("model file not found at {path}")]
    ModelFileMissing { path: PathBuf },
}

/// Blob store failures. The gateway never retries.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("invalid object key: {key:?}")]
    InvalidKey { key: String },

    #[error("IO error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request for {key} failed: {source}")]
    Http {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("blob store returned status {status} for {key}")]
    Status { key: String, status: u16 },

    #[error("object {key} is not a readable table: {source}")]
    Table {
        key: String,
        #[source]
        source: TableError,
    },
}

impl StorageError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Model artifact (de)serialization and inference failures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact could not be deserialized: {message}")]
    Deserialization { message: String },

    #[error("unsupported model artifact format: {found}")]
    UnsupportedFormat { found: String },

    #[error("unsupported model artifact version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("prediction failed: {message}")]
    Prediction { message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    pub fn prediction(message: impl Into<String>) -> Self {
        Self::Prediction {
            message: message.into(),
        }
    }
}

/// Delimited-table read/write failures.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no header row: {path}")]
    Empty { path: PathBuf },

    #[error("unknown column: {column}")]
    UnknownColumn { column: String },
}
