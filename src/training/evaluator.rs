//! Model evaluator
//!
//! Writes the per-class classification report for the test split and the
//! training curves of a finished run.

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::artifact::{DataIngestionArtifact, ModelTrainerArtifact};
use crate::run_id::RunId;
use crate::utils::charts::{write_charts, DataSeries, LineChart, COLOR_TRAIN, COLOR_VALIDATION};
use crate::utils::error::Result;
use crate::utils::metrics::ClassificationReport;

/// Default root for evaluation outputs
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

pub struct ModelEvaluator {
    artifacts_dir: PathBuf,
}

impl Default for ModelEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACTS_DIR)
    }
}

impl ModelEvaluator {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn report_path(&self, run_id: &RunId) -> PathBuf {
        self.artifacts_dir
            .join("evaluation")
            .join(format!("classification_report_{}.csv", run_id))
    }

    pub fn plot_path(&self, run_id: &RunId) -> PathBuf {
        self.artifacts_dir
            .join("plots")
            .join(format!("training_curves_{}.svg", run_id))
    }

    /// Predict every test example and write the classification report
    pub fn evaluate<B: AutodiffBackend>(
        &self,
        data: &DataIngestionArtifact,
        model_artifact: &ModelTrainerArtifact<B>,
        run_id: &RunId,
    ) -> Result<PathBuf> {
        info!("Model evaluation started");

        let (predictions, labels) = model_artifact.model.predict_dataset(&data.test)?;
        let report = ClassificationReport::from_predictions(&predictions, &labels, &data.class_names);

        let path = self.report_path(run_id);
        report.write_csv(&path)?;
        info!(
            "Test accuracy {:.2}% over {} images; report saved at {:?}",
            report.accuracy * 100.0,
            labels.len(),
            path
        );
        Ok(path)
    }

    /// Accuracy and loss curves, train against validation
    pub fn plot_training_curves<B: AutodiffBackend>(
        &self,
        model_artifact: &ModelTrainerArtifact<B>,
        run_id: &RunId,
    ) -> Result<PathBuf> {
        let history = &model_artifact.history;
        let charts = [
            LineChart::new("Accuracy", "Epoch", "Accuracy")
                .with_series(DataSeries::new("Train Accuracy", COLOR_TRAIN, history.series("accuracy")))
                .with_series(DataSeries::new(
                    "Validation Accuracy",
                    COLOR_VALIDATION,
                    history.series("val_accuracy"),
                )),
            LineChart::new("Loss", "Epoch", "Loss")
                .with_series(DataSeries::new("Train Loss", COLOR_TRAIN, history.series("loss")))
                .with_series(DataSeries::new(
                    "Validation Loss",
                    COLOR_VALIDATION,
                    history.series("val_loss"),
                )),
        ];

        let path = self.plot_path(run_id);
        write_charts(&charts, &path)?;
        info!("Training curves saved at {:?}", path);
        Ok(path)
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ingestion::{ImageDataset, ImageItem};
    use crate::dataset::preprocessing::{BatchTransform, PreparedDataset};
    use crate::model::{Model, ModelKind};
    use crate::training::history::{EpochMetrics, TrainingHistory};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn model_artifact(epochs: usize) -> ModelTrainerArtifact<TestBackend> {
        let mut model = Model::<TestBackend>::new(ModelKind::SimpleCnn, Default::default());
        model.build((32, 32, 3), 2).unwrap();
        let mut history = TrainingHistory::default();
        for epoch in 1..=epochs {
            history.push(EpochMetrics {
                epoch,
                loss: 1.0 / epoch as f64,
                accuracy: 0.5 + 0.1 * epoch as f64,
                val_loss: Some(1.2 / epoch as f64),
                val_accuracy: Some(0.4 + 0.1 * epoch as f64),
            });
        }
        ModelTrainerArtifact {
            model,
            history,
            model_path: None,
        }
    }

    fn data() -> DataIngestionArtifact {
        let items: Vec<ImageItem> = (0..6)
            .map(|i| ImageItem {
                image: vec![128.0; 3 * 32 * 32],
                label: i % 2,
            })
            .collect();
        let split = || {
            PreparedDataset::new(
                ImageDataset::from_items(items.clone(), (32, 32), 4),
                BatchTransform::Normalize,
                2,
            )
        };
        DataIngestionArtifact::new(split(), split(), vec!["cat".into(), "dog".into()], 2).unwrap()
    }

    #[test]
    fn test_report_rows() {
        let dir = TempDir::new().unwrap();
        let evaluator = ModelEvaluator::new(dir.path());
        let run_id = RunId::new("20240101_120000").unwrap();

        let path = evaluator.evaluate(&data(), &model_artifact(1), &run_id).unwrap();
        assert_eq!(
            path,
            dir.path().join("evaluation/classification_report_20240101_120000.csv")
        );

        let csv = std::fs::read_to_string(path).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows[0], "class,precision,recall,f1-score,support");
        assert!(rows[1].starts_with("cat,"));
        assert!(rows[2].starts_with("dog,"));
        assert!(rows[3].starts_with("accuracy,"));
        assert!(rows[3].ends_with(",6"));
        assert!(rows[4].starts_with("macro avg,"));
        assert!(rows[5].starts_with("weighted avg,"));
    }

    #[test]
    fn test_training_curves() {
        let dir = TempDir::new().unwrap();
        let evaluator = ModelEvaluator::new(dir.path());
        let run_id = RunId::new("run7").unwrap();

        let path = evaluator.plot_training_curves(&model_artifact(5), &run_id).unwrap();
        assert_eq!(path, dir.path().join("plots/training_curves_run7.svg"));
        let svg = std::fs::read_to_string(path).unwrap();
        assert!(svg.starts_with("<svg") || svg.starts_with("<?xml"));
        assert!(svg.contains("Validation Accuracy"));
        assert!(svg.contains("Train Loss"));
    }

    #[test]
    fn test_evaluate_unbuilt_model_fails() {
        let dir = TempDir::new().unwrap();
        let evaluator = ModelEvaluator::new(dir.path());
        let artifact = ModelTrainerArtifact::<TestBackend> {
            model: Model::new(ModelKind::SimpleCnn, Default::default()),
            history: TrainingHistory::default(),
            model_path: None,
        };
        let run_id = RunId::new("x").unwrap();
        assert!(evaluator.evaluate(&data(), &artifact, &run_id).is_err());
    }
}
