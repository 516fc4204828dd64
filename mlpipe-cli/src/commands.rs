//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;

use mlpipe_core::config::{DataValidationConfig, DatabaseCredentials, PredictorConfig};
use mlpipe_core::data::validate::DataValidation;
use mlpipe_core::data::{CsvRecordSource, RecordSource, SqliteRecordSource};
use mlpipe_core::{
    DataIngestionArtifact, PipelineConfig, PipelineOutcome, PredictionService, SchemaDefinition,
    Table, TrainingPipeline, resolve_latest_model, storage,
};

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run ingestion, validation, transformation, training, evaluation and promotion
    Train {
        /// CSV export to ingest instead of the database named by DATABASE_URL
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Validate a train/test pair against the schema
    Validate {
        #[arg(long)]
        train: PathBuf,
        #[arg(long)]
        test: PathBuf,
        /// Where to write the report (default: ./report.yaml)
        #[arg(long, default_value = "report.yaml")]
        report: PathBuf,
    },
    /// Predict labels for every row of a CSV file with the latest trained model
    Predict {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print the path of the model prediction would use
    Resolve,
    /// Print the loaded schema as JSON
    Schema,
}

pub fn handle_command(command: Commands, config: &PipelineConfig) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Train { input } => train(config, input.as_deref()),
        Commands::Validate {
            train,
            test,
            report,
        } => validate(config, train, test, report),
        Commands::Predict { input } => predict(config, &input),
        Commands::Resolve => {
            let path = resolve_latest_model(
                &config.artifact_dir,
                &mlpipe_core::config::default_model_subpath(),
            )?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema => {
            let schema = load_schema(config)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_schema(config: &PipelineConfig) -> anyhow::Result<SchemaDefinition> {
    SchemaDefinition::load(&config.schema_path)
        .with_context(|| format!("loading schema {}", config.schema_path.display()))
}

fn train(config: &PipelineConfig, input: Option<&Path>) -> anyhow::Result<ExitCode> {
    let schema = load_schema(config)?;
    let source: Box<dyn RecordSource> = match input {
        Some(path) => Box::new(CsvRecordSource::new(path)),
        None => {
            let credentials = DatabaseCredentials::from_env()?;
            Box::new(SqliteRecordSource::from_url(
                &credentials.url,
                config.ingestion.collection_name.clone(),
            ))
        }
    };
    let gateway = storage::connect(&config.storage)?;

    let run = TrainingPipeline::new(config.clone(), schema, source, gateway)
        .run()
        .context("training pipeline failed")?;
    println!("run: {}", run.run.artifact_dir.display());
    match run.outcome {
        PipelineOutcome::ValidationFailed(validation) => {
            println!("validation failed: {}", validation.message);
            Ok(ExitCode::from(2))
        }
        PipelineOutcome::ModelRejected(evaluation) => {
            println!(
                "model not promoted: F1 change {:+.4} (threshold {})",
                evaluation.changed_accuracy, config.evaluation.changed_threshold
            );
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::Promoted(pushed) => {
            println!("promoted to {}/{}", pushed.bucket_name, pushed.s3_model_path);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn validate(
    config: &PipelineConfig,
    train: PathBuf,
    test: PathBuf,
    report: PathBuf,
) -> anyhow::Result<ExitCode> {
    let schema = load_schema(config)?;
    let ingestion = DataIngestionArtifact {
        trained_file_path: train,
        test_file_path: test,
    };
    let artifact =
        DataValidation::new(DataValidationConfig::with_report_path(report), schema).run(&ingestion)?;
    println!("validation_status: {}", artifact.validation_status);
    if !artifact.message.is_empty() {
        println!("message: {}", artifact.message);
    }
    println!("report: {}", artifact.validation_report_file_path.display());
    Ok(if artifact.validation_status {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn predict(config: &PipelineConfig, input: &Path) -> anyhow::Result<ExitCode> {
    let table = Table::read_csv(input).with_context(|| format!("reading {}", input.display()))?;
    let labels = PredictionService::new(PredictorConfig::new(config)).predict(&table)?;
    for label in labels {
        println!("{label}");
    }
    Ok(ExitCode::SUCCESS)
}
