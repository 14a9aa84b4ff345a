//! Values handed between pipeline stages

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;

use crate::dataset::preprocessing::PreparedDataset;
use crate::model::Model;
use crate::training::history::TrainingHistory;
use crate::utils::error::{PipelineError, Result};

/// Output of the data pipeline
#[derive(Debug)]
pub struct DataIngestionArtifact {
    pub train: PreparedDataset,
    pub test: PreparedDataset,
    pub class_names: Vec<String>,
    pub num_classes: usize,
}

impl DataIngestionArtifact {
    pub fn new(
        train: PreparedDataset,
        test: PreparedDataset,
        class_names: Vec<String>,
        num_classes: usize,
    ) -> Result<Self> {
        if num_classes != class_names.len() {
            return Err(PipelineError::Inconsistency(format!(
                "num_classes is {} but {} class names were given",
                num_classes,
                class_names.len()
            )));
        }
        Ok(Self {
            train,
            test,
            class_names,
            num_classes,
        })
    }
}

/// Output of the model trainer
pub struct ModelTrainerArtifact<B: AutodiffBackend> {
    pub model: Model<B>,
    pub history: TrainingHistory,
    /// Best checkpoint, `None` if validation loss never produced one
    pub model_path: Option<PathBuf>,
}
