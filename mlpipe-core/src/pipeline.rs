//! End-to-end training pipeline.
//!
//! Stages run strictly in order inside one fresh run directory. The pipeline
//! stops early when validation fails or the trained model is not accepted;
//! any stage error aborts the run and propagates with its cause chain.

use chrono::{DateTime, Local};

use crate::artifact::{
    DataIngestionArtifact, DataValidationArtifact, ModelEvaluationArtifact, ModelPusherArtifact,
    ModelTrainerArtifact,
};
use crate::config::{
    DataIngestionConfig, DataTransformationConfig, DataValidationConfig, ModelEvaluationConfig,
    ModelPusherConfig, ModelTrainerConfig, PipelineConfig, TrainingPipelineConfig,
};
use crate::data::ingest::DataIngestion;
use crate::data::schema::SchemaDefinition;
use crate::data::source::RecordSource;
use crate::data::transform::DataTransformation;
use crate::data::validate::DataValidation;
use crate::error::PipelineError;
use crate::eval::ModelEvaluation;
use crate::promotion::{ModelPusher, PromotionLock};
use crate::storage::StorageGateway;
use crate::training::ModelTrainer;

/// How a run ended when no stage failed.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The schema gate failed; nothing past validation ran.
    ValidationFailed(DataValidationArtifact),
    /// The trained model did not beat production by the required margin.
    ModelRejected(ModelEvaluationArtifact),
    /// The trained model is now the production model.
    Promoted(ModelPusherArtifact),
}

/// A finished run: its directory and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub run: TrainingPipelineConfig,
    pub outcome: PipelineOutcome,
}

pub struct TrainingPipeline {
    config: PipelineConfig,
    schema: SchemaDefinition,
    source: Box<dyn RecordSource>,
    gateway: StorageGateway,
}

impl TrainingPipeline {
    pub fn new(
        config: PipelineConfig,
        schema: SchemaDefinition,
        source: Box<dyn RecordSource>,
        gateway: StorageGateway,
    ) -> Self {
        Self {
            config,
            schema,
            source,
            gateway,
        }
    }

    pub fn run(self) -> Result<PipelineRun, PipelineError> {
        self.run_at(Local::now())
    }

    /// Run with an explicit run timestamp.
    pub fn run_at(self, now: DateTime<Local>) -> Result<PipelineRun, PipelineError> {
        let run = TrainingPipelineConfig::create(
            &self.config.pipeline_name,
            &self.config.artifact_dir,
            now,
        )
        .map_err(|e| PipelineError::io(&self.config.artifact_dir, e))?;
        let span = tracing::info_span!(
            "pipeline_run",
            pipeline = %self.config.pipeline_name,
            run = %run.timestamp
        );
        let _entered = span.enter();
        tracing::info!(dir = %run.artifact_dir.display(), "Starting training pipeline run");

        let ingestion = DataIngestion::new(
            DataIngestionConfig::new(&run, &self.config.ingestion),
            self.source,
        )
        .run()?;

        let validation = DataValidation::new(DataValidationConfig::new(&run), self.schema.clone())
            .run(&ingestion)?;
        if !validation.validation_status {
            tracing::warn!(message = %validation.message, "Validation gate failed; stopping run");
            return Ok(PipelineRun {
                run,
                outcome: PipelineOutcome::ValidationFailed(validation),
            });
        }

        let transformation =
            DataTransformation::new(DataTransformationConfig::new(&run), self.schema.clone())
                .run(&ingestion, &validation)?;

        let trainer = ModelTrainer::new(ModelTrainerConfig::new(&run, &self.config.trainer))
            .run(&transformation)?;

        let evaluation = ModelEvaluation::new(
            ModelEvaluationConfig::new(&self.config),
            self.gateway.clone(),
            self.schema.target_column.clone(),
        );
        let pusher = ModelPusher::new(ModelPusherConfig::new(&self.config), self.gateway.clone());
        let outcome = evaluate_and_promote(&evaluation, &pusher, &ingestion, &trainer)?;
        if matches!(outcome, PipelineOutcome::Promoted(_)) {
            tracing::info!("Training pipeline run complete");
        }
        Ok(PipelineRun { run, outcome })
    }
}

/// Compare the trained model with production and upload it if accepted.
///
/// The promotion lock is held from before the comparison until the upload
/// finishes, so no other run can replace the production model in between.
pub(crate) fn evaluate_and_promote(
    evaluation: &ModelEvaluation,
    pusher: &ModelPusher,
    ingestion: &DataIngestionArtifact,
    trainer: &ModelTrainerArtifact,
) -> Result<PipelineOutcome, PipelineError> {
    let lock = PromotionLock::acquire(&pusher.config().lock_file_path)?;
    let evaluated = evaluation.run(ingestion, trainer)?;
    if !evaluated.is_model_accepted {
        tracing::info!("Trained model is not better than production; not promoting");
        return Ok(PipelineOutcome::ModelRejected(evaluated));
    }
    let pushed = pusher.run(&evaluated, &lock)?;
    Ok(PipelineOutcome::Promoted(pushed))
}
