//! Fixed names and defaults shared by the pipeline stages.

pub const DATABASE_URL_KEY: &str = "DATABASE_URL";
pub const ACCESS_KEY_ID_KEY: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_KEY: &str = "AWS_SECRET_ACCESS_KEY";

pub const COLLECTION_NAME: &str = "Proj1-Data";
pub const ARTIFACT_DIR: &str = "artifact";
pub const SCHEMA_FILE_PATH: &str = "config/schema.yaml";
pub const TARGET_COLUMN: &str = "Response";

/// Timestamp format of run directories under the artifact root.
pub const RUN_TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

pub const FILE_NAME: &str = "data.csv";
pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";
pub const MODEL_FILE_NAME: &str = "model.pkl";
pub const PREPROCESSING_OBJECT_FILE_NAME: &str = "preprocessing.pkl";

pub const DATA_INGESTION_DIR_NAME: &str = "data_ingestion";
pub const DATA_INGESTION_FEATURE_STORE_DIR: &str = "feature_store";
pub const DATA_INGESTION_INGESTED_DIR: &str = "ingested";
pub const DATA_INGESTION_TRAIN_TEST_SPLIT_RATIO: f64 = 0.25;

pub const DATA_VALIDATION_DIR_NAME: &str = "data_validation";
pub const DATA_VALIDATION_REPORT_FILE_NAME: &str = "report.yaml";

pub const DATA_TRANSFORMATION_DIR_NAME: &str = "data_transformation";
pub const DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR: &str = "transformed";
pub const DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR: &str = "transformed_object";

pub const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
pub const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "model_trainer";
pub const MODEL_TRAINER_EXPECTED_SCORE: f64 = 0.6;

pub const MODEL_EVALUATION_CHANGED_THRESHOLD_SCORE: f64 = 0.02;
pub const MODEL_BUCKET_NAME: &str = "my-model-mlopsproj";
pub const MODEL_PUSHER_S3_KEY: &str = "model-registry";

/// Lock file taken in the artifact root while a model is being promoted.
pub const PROMOTION_LOCK_FILE_NAME: &str = ".promotion.lock";
