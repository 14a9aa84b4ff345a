//! Model trainer
//!
//! Builds the configured model, trains it on the ingested splits and reports
//! parameters, per-epoch metrics and the best checkpoint to the experiment
//! tracker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use crate::artifact::{DataIngestionArtifact, ModelTrainerArtifact};
use crate::config::{Config, EarlyStoppingParams, ModelParams, TransferLearningParams};
use crate::model::{Model, ModelKind};
use crate::run_id::RunId;
use crate::tracking::{ActiveRun, ExperimentTracker, FileTracker};
use crate::training::hooks::{BestCheckpoint, EarlyStopping, MetricTracking, TrainingHook};
use crate::utils::error::{PipelineError, Result};
use crate::DEFAULT_INPUT_SHAPE;

/// Default directory for best checkpoints
pub const DEFAULT_MODEL_DIR: &str = "artifacts/model";

/// Trainer progress; `Failed` can follow any other state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    Built,
    Compiled,
    Training,
    Completed,
    Failed,
}

pub struct ModelTrainer {
    model_type: String,
    model_params: ModelParams,
    batch_size: usize,
    image_size: (usize, usize),
    early_stopping: Option<EarlyStoppingParams>,
    transfer: TransferLearningParams,
    input_shape: (usize, usize, usize),
    model_dir: PathBuf,
    tracker: Box<dyn ExperimentTracker>,
    state: TrainerState,
}

impl ModelTrainer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let data = config.data()?;
        Ok(Self {
            model_type: config.model_type()?,
            model_params: config.model()?,
            batch_size: data.batch_size,
            image_size: data.img_size,
            early_stopping: config.early_stopping()?,
            transfer: config.transfer_learning()?,
            input_shape: DEFAULT_INPUT_SHAPE,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            tracker: Box::new(FileTracker::new(config.tracking()?.dir)),
            state: TrainerState::Idle,
        })
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Override the `(height, width, channels)` the network is built for
    pub fn with_input_shape(mut self, input_shape: (usize, usize, usize)) -> Self {
        self.input_shape = input_shape;
        self
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Train on `artifact.train`, validating on `artifact.test`.
    ///
    /// Fails with a configuration error when no run identifier is given.
    pub fn train<B: AutodiffBackend>(
        &mut self,
        artifact: &DataIngestionArtifact,
        run_id: Option<&RunId>,
        device: B::Device,
    ) -> Result<ModelTrainerArtifact<B>> {
        let result = self.run::<B>(artifact, run_id, device);
        self.state = match result {
            Ok(_) => TrainerState::Completed,
            Err(_) => TrainerState::Failed,
        };
        result
    }

    fn run<B: AutodiffBackend>(
        &mut self,
        artifact: &DataIngestionArtifact,
        run_id: Option<&RunId>,
        device: B::Device,
    ) -> Result<ModelTrainerArtifact<B>> {
        let run_id = run_id.ok_or_else(|| {
            PipelineError::Configuration("run identifier is not set".to_string())
        })?;
        info!("Starting model training for run {}", run_id);

        let mut run = ActiveRun::start(self.tracker.as_mut(), run_id.as_str())?;

        let kind = ModelKind::from_discriminator(&self.model_type);
        let mut model = Model::<B>::new(kind, device)
            .with_transfer_learning(self.transfer.clone())
            .with_learning_rate(self.model_params.learning_rate);
        model.build(self.input_shape, artifact.num_classes)?;
        model.set_class_names(artifact.class_names.clone())?;
        self.state = TrainerState::Built;

        run.log_params(&hyperparameters(
            &self.model_params,
            kind,
            self.batch_size,
            self.image_size,
        ))?;

        model.compile(
            &self.model_params.optimizer,
            &self.model_params.loss,
            &self.model_params.metrics,
        )?;
        self.state = TrainerState::Compiled;

        let mut checkpoint = BestCheckpoint::for_run(&self.model_dir, run_id.as_str());
        let mut early_stopping = self
            .early_stopping
            .as_ref()
            .map(|p| EarlyStopping::<B>::new(&p.monitor, p.patience));

        self.state = TrainerState::Training;
        let history = {
            let mut tracking = MetricTracking::new(&mut run);
            let mut hooks: Vec<&mut dyn TrainingHook<B>> = Vec::new();
            hooks.push(&mut tracking);
            if let Some(hook) = early_stopping.as_mut() {
                hooks.push(hook);
            }
            hooks.push(&mut checkpoint);
            model.fit(
                &artifact.train,
                Some(&artifact.test),
                self.model_params.epochs,
                &mut hooks,
            )?
        };

        let model_path = checkpoint.saved_path().map(Path::to_path_buf);
        match &model_path {
            Some(path) => run.log_model(path)?,
            None => warn!("No checkpoint was written; nothing to upload"),
        }
        run.finish()?;

        info!("Model training finished after {} epochs", history.len());
        Ok(ModelTrainerArtifact {
            model,
            history,
            model_path,
        })
    }
}

fn hyperparameters(
    params: &ModelParams,
    kind: ModelKind,
    batch_size: usize,
    image_size: (usize, usize),
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("model_type".to_string(), kind.to_string()),
        ("optimizer".to_string(), params.optimizer.clone()),
        ("loss".to_string(), params.loss.clone()),
        ("epochs".to_string(), params.epochs.to_string()),
        ("learning_rate".to_string(), params.learning_rate.to_string()),
        ("batch_size".to_string(), batch_size.to_string()),
        (
            "image_size".to_string(),
            format!("{}x{}", image_size.0, image_size.1),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ingestion::{ImageDataset, ImageItem};
    use crate::dataset::preprocessing::{BatchTransform, PreparedDataset};
    use crate::tracking::RunStatus;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    const SIZE: usize = 32;

    fn config(tracking_dir: &Path) -> Config {
        Config::from_yaml_str(&format!(
            r#"
data_config:
  TRAIN_DIR: data/train
  TEST_DIR: data/test
  IMG_SIZE: [{SIZE}, {SIZE}]
  BATCH_SIZE: 4
  SEED: 42
model_config:
  optimizer: adam
  loss: sparse_categorical_crossentropy
  metrics: [accuracy]
  epochs: 2
tracking:
  dir: {}
"#,
            tracking_dir.display()
        ))
        .unwrap()
    }

    fn split(count: usize) -> PreparedDataset {
        let items = (0..count)
            .map(|i| ImageItem {
                image: vec![if i % 2 == 0 { 10.0 } else { 240.0 }; 3 * SIZE * SIZE],
                label: i % 2,
            })
            .collect();
        PreparedDataset::new(
            ImageDataset::from_items(items, (SIZE, SIZE), 4),
            BatchTransform::Normalize,
            2,
        )
    }

    fn artifact() -> DataIngestionArtifact {
        DataIngestionArtifact::new(split(8), split(4), vec!["cat".into(), "dog".into()], 2).unwrap()
    }

    #[test]
    fn test_missing_run_id_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let mut trainer = ModelTrainer::from_config(&config(&dir.path().join("mlruns")))
            .unwrap()
            .with_input_shape((SIZE, SIZE, 3));
        let result = trainer.train::<TestBackend>(&artifact(), None, Default::default());
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
        assert_eq!(trainer.state(), TrainerState::Failed);
    }

    #[test]
    fn test_train_logs_run_and_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mlruns = dir.path().join("mlruns");
        let mut trainer = ModelTrainer::from_config(&config(&mlruns))
            .unwrap()
            .with_input_shape((SIZE, SIZE, 3))
            .with_model_dir(dir.path().join("model"));
        let run_id = RunId::new("20240101_120000").unwrap();

        let output = trainer
            .train::<TestBackend>(&artifact(), Some(&run_id), Default::default())
            .unwrap();
        assert_eq!(trainer.state(), TrainerState::Completed);
        assert_eq!(output.history.len(), 2);
        assert_eq!(output.model.class_names().len(), 2);

        let path = output.model_path.unwrap();
        assert_eq!(path, dir.path().join("model/20240101_120000.mpk"));
        assert!(path.exists());

        let tracker = FileTracker::new(&mlruns);
        assert_eq!(tracker.read_meta("20240101_120000").unwrap().status, RunStatus::Finished);
        let metrics = tracker.read_metrics("20240101_120000").unwrap();
        assert_eq!(metrics.len(), 8);
        assert!(metrics.iter().any(|m| m.key == "val_accuracy" && m.step == 2));
        assert!(mlruns.join("20240101_120000/artifacts/20240101_120000.mpk").exists());
    }

    #[test]
    fn test_failed_fit_marks_run_failed() {
        let dir = TempDir::new().unwrap();
        let mlruns = dir.path().join("mlruns");
        let cfg = config(&mlruns);
        let mut trainer = ModelTrainer::from_config(&cfg)
            .unwrap()
            .with_input_shape((64, 64, 3))
            .with_model_dir(dir.path().join("model"));
        let run_id = RunId::new("bad_shape").unwrap();

        assert!(trainer
            .train::<TestBackend>(&artifact(), Some(&run_id), Default::default())
            .is_err());
        assert_eq!(trainer.state(), TrainerState::Failed);
        let tracker = FileTracker::new(&mlruns);
        assert_eq!(tracker.read_meta("bad_shape").unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_completed_epochs_tracked_when_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let mlruns = dir.path().join("mlruns");
        // a plain file where the model directory should be
        let blocked = dir.path().join("model");
        std::fs::write(&blocked, b"").unwrap();
        let mut trainer = ModelTrainer::from_config(&config(&mlruns))
            .unwrap()
            .with_input_shape((SIZE, SIZE, 3))
            .with_model_dir(&blocked);
        let run_id = RunId::new("blocked").unwrap();

        assert!(trainer
            .train::<TestBackend>(&artifact(), Some(&run_id), Default::default())
            .is_err());

        let tracker = FileTracker::new(&mlruns);
        assert_eq!(tracker.read_meta("blocked").unwrap().status, RunStatus::Failed);
        let metrics = tracker.read_metrics("blocked").unwrap();
        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().all(|m| m.step == 1));
    }

    #[test]
    fn test_dotted_run_ids_get_separate_checkpoints() {
        let dir = TempDir::new().unwrap();
        let mlruns = dir.path().join("mlruns");
        let mut paths = Vec::new();
        for id in ["exp.v1", "exp.v2"] {
            let mut trainer = ModelTrainer::from_config(&config(&mlruns))
                .unwrap()
                .with_input_shape((SIZE, SIZE, 3))
                .with_model_dir(dir.path().join("model"));
            let run_id = RunId::new(id).unwrap();
            let output = trainer
                .train::<TestBackend>(&artifact(), Some(&run_id), Default::default())
                .unwrap();
            paths.push(output.model_path.unwrap());
        }

        assert_eq!(paths[0], dir.path().join("model/exp.v1.mpk"));
        assert_eq!(paths[1], dir.path().join("model/exp.v2.mpk"));
        assert!(paths.iter().all(|p| p.exists()));
        assert!(dir.path().join("model/exp.v1.json").exists());
        assert!(mlruns.join("exp.v2/artifacts/exp.v2.mpk").exists());
    }

    #[test]
    fn test_hyperparameters() {
        let params = ModelParams {
            optimizer: "adam".into(),
            loss: "sparse_categorical_crossentropy".into(),
            metrics: vec!["accuracy".into()],
            epochs: 10,
            learning_rate: 1e-3,
        };
        let logged = hyperparameters(&params, ModelKind::Vgg16, 32, (224, 224));
        assert_eq!(logged["optimizer"], "adam");
        assert_eq!(logged["epochs"], "10");
        assert_eq!(logged["batch_size"], "32");
        assert_eq!(logged["image_size"], "224x224");
        assert_eq!(logged["model_type"], "vgg16");
    }
}
