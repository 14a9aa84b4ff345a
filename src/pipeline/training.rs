//! Training pipeline

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::artifact::{DataIngestionArtifact, ModelTrainerArtifact};
use crate::config::Config;
use crate::run_id::RunId;
use crate::training::{ModelEvaluator, ModelTrainer};
use crate::utils::error::Result;

/// Everything a finished training run produced
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: ModelTrainerArtifact<B>,
    pub report_path: PathBuf,
    pub plot_path: PathBuf,
}

pub struct TrainingPipeline {
    trainer: ModelTrainer,
    evaluator: ModelEvaluator,
}

impl TrainingPipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(ModelTrainer::from_config(config)?, ModelEvaluator::default()))
    }

    pub fn new(trainer: ModelTrainer, evaluator: ModelEvaluator) -> Self {
        Self { trainer, evaluator }
    }

    pub fn run<B: AutodiffBackend>(
        &mut self,
        data: &DataIngestionArtifact,
        run_id: &RunId,
        device: B::Device,
    ) -> Result<TrainingOutcome<B>> {
        info!("Starting training pipeline for run {}", run_id);

        let model = self.trainer.train::<B>(data, Some(run_id), device)?;
        let report_path = self.evaluator.evaluate(data, &model, run_id)?;
        let plot_path = self.evaluator.plot_training_curves(&model, run_id)?;

        info!("Training pipeline completed successfully");
        Ok(TrainingOutcome {
            model,
            report_path,
            plot_path,
        })
    }
}
