//! End-to-end tests: validation scenarios, model resolution and full pipeline runs.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{Local, TimeZone};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use mlpipe_core::config::{DataValidationConfig, PredictorConfig, default_model_subpath};
use mlpipe_core::data::validate::{
    DataValidation, ValidationReport, validate_column_count, validate_required_columns,
};
use mlpipe_core::data::{CsvRecordSource, SchemaDefinition, Table};
use mlpipe_core::inference::{PredictionRequest, PredictionService, resolve_latest_model};
use mlpipe_core::{
    ArtifactNotFoundError, DataIngestionArtifact, PipelineConfig, PipelineOutcome,
    TrainingPipeline, storage,
};

// --- Validation scenarios ---

fn abc_schema() -> SchemaDefinition {
    SchemaDefinition::from_yaml_str(
        "columns: [a, b, c]\nnumerical_columns: [a]\ncategorical_columns: [b]\n",
    )
    .unwrap()
}

fn write_tables(dir: &Path, header: &str) -> DataIngestionArtifact {
    let train = dir.join("ingested/train.csv");
    let test = dir.join("ingested/test.csv");
    std::fs::create_dir_all(dir.join("ingested")).unwrap();
    std::fs::write(&train, format!("{header}\n1,x,2\n")).unwrap();
    std::fs::write(&test, format!("{header}\n3,y,4\n")).unwrap();
    DataIngestionArtifact {
        trained_file_path: train,
        test_file_path: test,
    }
}

fn validate(dir: &Path, header: &str) -> (Table, mlpipe_core::DataValidationArtifact) {
    let ingestion = write_tables(dir, header);
    let report = dir.join("data_validation/report.yaml");
    let stage = DataValidation::new(DataValidationConfig::with_report_path(&report), abc_schema());
    let artifact = stage.run(&ingestion).unwrap();
    (Table::read_csv(&ingestion.trained_file_path).unwrap(), artifact)
}

#[test]
fn scenario_a_matching_table_passes() {
    let dir = TempDir::new().unwrap();
    let (table, artifact) = validate(dir.path(), "a,b,c");
    assert!(validate_column_count(&table, &abc_schema()));
    assert!(validate_required_columns(&table, &abc_schema()));
    assert!(artifact.validation_status);
    assert_eq!(artifact.message, "");
}

#[test]
fn scenario_b_short_table_fails() {
    let dir = TempDir::new().unwrap();
    let ingestion = write_tables(dir.path(), "a,c");
    std::fs::write(&ingestion.trained_file_path, "a,c\n1,2\n").unwrap();
    std::fs::write(&ingestion.test_file_path, "a,c\n3,4\n").unwrap();
    let table = Table::read_csv(&ingestion.trained_file_path).unwrap();
    assert!(!validate_column_count(&table, &abc_schema()));

    let report = dir.path().join("report.yaml");
    let artifact = DataValidation::new(DataValidationConfig::with_report_path(&report), abc_schema())
        .run(&ingestion)
        .unwrap();
    assert!(!artifact.validation_status);
    assert!(artifact.message.contains("missing in training dataframe"));
    assert!(artifact.message.contains("missing in testing dataframe"));
}

#[test]
fn scenario_c_renamed_column_needs_both_checks() {
    let dir = TempDir::new().unwrap();
    let (table, artifact) = validate(dir.path(), "a,x,c");
    assert!(validate_column_count(&table, &abc_schema()));
    assert!(!validate_required_columns(&table, &abc_schema()));
    assert!(!artifact.validation_status);
    assert!(artifact.message.contains("missing categorical columns [b]"));
}

#[test]
fn report_round_trip_and_idempotence() {
    let dir = TempDir::new().unwrap();
    let report = ValidationReport::from_message("Columns are missing in training dataframe: x");
    let path = dir.path().join("nested/dir/report.yaml");
    report.write(&path).unwrap();
    assert_eq!(ValidationReport::read(&path).unwrap(), report);

    let (_, first) = validate(dir.path(), "a,x,c");
    let first_bytes = std::fs::read(&first.validation_report_file_path).unwrap();
    let (_, second) = validate(dir.path(), "a,x,c");
    let second_bytes = std::fs::read(&second.validation_report_file_path).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

// --- Model resolution ---

fn run_with_model(root: &Path, name: &str, age_secs: u64) -> PathBuf {
    let run = root.join(name);
    let model = run.join(default_model_subpath());
    std::fs::create_dir_all(model.parent().unwrap()).unwrap();
    std::fs::write(&model, b"{}").unwrap();
    std::fs::File::open(&run)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
    model
}

#[test]
fn resolution_returns_newest_of_three() {
    let root = TempDir::new().unwrap();
    run_with_model(root.path(), "t1", 300);
    run_with_model(root.path(), "t2", 200);
    let t3 = run_with_model(root.path(), "t3", 100);
    assert_eq!(
        resolve_latest_model(root.path(), &default_model_subpath()).unwrap(),
        t3
    );
}

#[test]
fn resolution_failures() {
    let root = TempDir::new().unwrap();
    assert!(matches!(
        resolve_latest_model(root.path(), &default_model_subpath()),
        Err(ArtifactNotFoundError::NoRunDirectories { .. })
    ));
    std::fs::create_dir(root.path().join("03_09_2025_14_05_07")).unwrap();
    assert!(matches!(
        resolve_latest_model(root.path(), &default_model_subpath()),
        Err(ArtifactNotFoundError::ModelFileMissing { .. })
    ));
}

// --- Full pipeline ---

const VEHICLE_SCHEMA: &str = "\
columns:
  - id: int
  - Gender: category
  - Age: int
  - Vehicle_Damage: category
  - Annual_Premium: float
  - Response: int
numerical_columns: [id, Age, Annual_Premium]
categorical_columns: [Gender, Vehicle_Damage]
drop_columns: [id]
num_features: [Age]
mm_columns: [Annual_Premium]
";

/// Response is 1 exactly when the vehicle was damaged.
fn write_export(path: &Path, with_damage: bool) {
    let mut csv = String::from("_id,id,Gender,Age");
    if with_damage {
        csv.push_str(",Vehicle_Damage");
    }
    csv.push_str(",Annual_Premium,Response\n");
    for i in 0..200u32 {
        let damaged = i % 5 < 2;
        let gender = if i % 2 == 0 { "Male" } else { "Female" };
        let age = 20 + (i * 7) % 50;
        let premium = 1000 + (i * 37) % 500;
        csv.push_str(&format!("oid{i},{i},{gender},{age}"));
        if with_damage {
            csv.push_str(if damaged { ",Yes" } else { ",No" });
        }
        csv.push_str(&format!(",{premium}.0,{}\n", u8::from(damaged)));
    }
    std::fs::write(path, csv).unwrap();
}

fn pipeline_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.artifact_dir = root.join("artifact");
    config.storage.root = root.join("blobstore");
    config.trainer.learning_rate = 0.5;
    config.trainer.epochs = 500;
    config
}

fn pipeline(root: &Path, export: &Path) -> TrainingPipeline {
    let config = pipeline_config(root);
    let gateway = storage::connect(&config.storage).unwrap();
    TrainingPipeline::new(
        config,
        SchemaDefinition::from_yaml_str(VEHICLE_SCHEMA).unwrap(),
        Box::new(CsvRecordSource::new(export)),
        gateway,
    )
}

#[test]
fn full_pipeline_promotes_then_rejects_equal_model() {
    let dir = TempDir::new().unwrap();
    let export = dir.path().join("export.csv");
    write_export(&export, true);

    let first_at = Local.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap();
    let first = pipeline(dir.path(), &export).run_at(first_at).unwrap();
    match &first.outcome {
        PipelineOutcome::Promoted(pushed) => {
            assert_eq!(pushed.bucket_name, "my-model-mlopsproj");
            assert_eq!(pushed.s3_model_path, "model-registry/model.pkl");
        }
        other => panic!("expected promotion, got {other:?}"),
    }
    assert_eq!(first.run.timestamp, "03_09_2025_10_00_00");
    assert!(
        first
            .run
            .artifact_dir
            .join("data_ingestion/feature_store/data.csv")
            .is_file()
    );
    assert!(first.run.artifact_dir.join(default_model_subpath()).is_file());
    assert!(!dir.path().join("artifact/.promotion.lock").exists());
    assert!(
        dir.path()
            .join("blobstore/my-model-mlopsproj/model-registry/model.pkl")
            .is_file()
    );

    let second_at = Local.with_ymd_and_hms(2025, 3, 9, 11, 0, 0).unwrap();
    let second = pipeline(dir.path(), &export).run_at(second_at).unwrap();
    match &second.outcome {
        PipelineOutcome::ModelRejected(evaluation) => {
            assert!(!evaluation.is_model_accepted);
            assert!(evaluation.changed_accuracy <= 0.02);
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let service = PredictionService::new(PredictorConfig::new(&pipeline_config(dir.path())));
    let model = service.load_latest().unwrap();
    assert_eq!(model.to_string(), "LogisticRegression()");
    let request = PredictionRequest::new()
        .with("id", 9001)
        .with("Gender", "Male")
        .with("Age", 41)
        .with("Vehicle_Damage", "Yes")
        .with("Annual_Premium", 1200.0);
    assert_eq!(model.predict(&request.to_table()).unwrap(), vec![1]);
    assert_eq!(service.predict_one(&request).unwrap(), "no");
}

#[test]
fn full_pipeline_stops_at_failed_validation() {
    let dir = TempDir::new().unwrap();
    let export = dir.path().join("export.csv");
    write_export(&export, false);

    let run = pipeline(dir.path(), &export).run().unwrap();
    let PipelineOutcome::ValidationFailed(validation) = &run.outcome else {
        panic!("expected validation failure, got {:?}", run.outcome);
    };
    assert!(!validation.validation_status);
    assert!(validation.message.contains("missing categorical columns [Vehicle_Damage]"));
    assert!(validation.validation_report_file_path.is_file());
    assert!(!run.run.artifact_dir.join("data_transformation").exists());
    assert!(!run.run.artifact_dir.join("model_trainer").exists());
}
