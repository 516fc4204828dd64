//! The model pusher stage: uploads an accepted model to the production key.

use crate::artifact::{ModelEvaluationArtifact, ModelPusherArtifact};
use crate::config::ModelPusherConfig;
use crate::error::PipelineError;
use crate::promotion::lock::PromotionLock;
use crate::storage::StorageGateway;

pub struct ModelPusher {
    config: ModelPusherConfig,
    gateway: StorageGateway,
}

impl ModelPusher {
    pub fn new(config: ModelPusherConfig, gateway: StorageGateway) -> Self {
        Self { config, gateway }
    }

    pub fn config(&self) -> &ModelPusherConfig {
        &self.config
    }

    /// Upload the trained model. The local file is kept.
    ///
    /// `lock` must be the promotion lock taken before the model was evaluated,
    /// so the production model it was compared with is still the current one.
    pub fn run(
        &self,
        evaluation: &ModelEvaluationArtifact,
        lock: &PromotionLock,
    ) -> Result<ModelPusherArtifact, PipelineError> {
        tracing::info!("Starting model pusher");
        if lock.path() != self.config.lock_file_path.as_path() {
            return Err(PipelineError::evaluation(format!(
                "promotion lock {} does not guard {}",
                lock.path().display(),
                self.config.lock_file_path.display()
            )));
        }
        if !evaluation.is_model_accepted {
            return Err(PipelineError::evaluation(
                "refusing to promote a model that was not accepted",
            ));
        }

        self.gateway.put_file(
            &evaluation.trained_model_path,
            &self.config.s3_model_key_path,
            false,
        )?;

        tracing::info!(
            bucket = %self.config.bucket_name,
            key = %self.config.s3_model_key_path,
            "Model promoted to production"
        );
        Ok(ModelPusherArtifact {
            bucket_name: self.config.bucket_name.clone(),
            s3_model_path: self.config.s3_model_key_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(dir: &Path) -> (ModelPusher, ModelEvaluationArtifact) {
        let model = dir.join("model.pkl");
        std::fs::write(&model, b"{}").unwrap();
        let config = ModelPusherConfig {
            bucket_name: "bucket".into(),
            s3_model_key_path: "model-registry/model.pkl".into(),
            lock_file_path: dir.join(".promotion.lock"),
        };
        let gateway = StorageGateway::new(Arc::new(MemoryBlobStore::new()), "bucket");
        let evaluation = ModelEvaluationArtifact {
            is_model_accepted: true,
            changed_accuracy: 0.1,
            s3_model_path: "model-registry/model.pkl".into(),
            trained_model_path: model,
        };
        (ModelPusher::new(config, gateway), evaluation)
    }

    #[test]
    fn test_push_uploads_and_keeps_local() {
        let dir = TempDir::new().unwrap();
        let (pusher, evaluation) = setup(dir.path());
        let lock = PromotionLock::acquire(&pusher.config().lock_file_path).unwrap();
        let artifact = pusher.run(&evaluation, &lock).unwrap();
        assert_eq!(artifact.s3_model_path, "model-registry/model.pkl");
        assert!(pusher.gateway.exists("model-registry/model.pkl").unwrap());
        assert!(evaluation.trained_model_path.exists());
        drop(lock);
        assert!(!dir.path().join(".promotion.lock").exists());
    }

    #[test]
    fn test_push_requires_its_own_lock() {
        let dir = TempDir::new().unwrap();
        let (pusher, evaluation) = setup(dir.path());
        let other = PromotionLock::acquire(&dir.path().join("other.lock")).unwrap();
        assert!(pusher.run(&evaluation, &other).is_err());
        assert!(!pusher.gateway.exists("model-registry").unwrap());
    }

    #[test]
    fn test_push_refuses_rejected_model() {
        let dir = TempDir::new().unwrap();
        let (pusher, mut evaluation) = setup(dir.path());
        evaluation.is_model_accepted = false;
        let lock = PromotionLock::acquire(&pusher.config().lock_file_path).unwrap();
        assert!(pusher.run(&evaluation, &lock).is_err());
    }
}
