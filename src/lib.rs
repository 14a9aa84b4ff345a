//! # Image Classifier
//!
//! An end-to-end image-classification training pipeline built on the Burn
//! framework: directory-tree datasets are validated, decoded, normalized and
//! optionally augmented, then a simple CNN or a VGG16 transfer-learning model
//! is trained with early stopping and best-checkpoint hooks, tracked as an
//! experiment run, and evaluated into a classification report and training
//! curves.
//!
//! ## Modules
//!
//! - `config`: YAML parameter file with typed sections
//! - `dataset`: validation, ingestion, augmentation, preprocessing, batching
//! - `model`: network variants and the build → compile → fit lifecycle
//! - `training`: hooks, trainer, evaluator
//! - `tracking`: file-backed experiment tracking
//! - `inference`: single-image prediction
//! - `pipeline`: data and training orchestration
//! - `utils`: logging, metrics, charts and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use image_classifier::{Config, DataPipeline, RunId, TrainingPipeline};
//! use image_classifier::backend::{default_device, TrainingBackend};
//!
//! let config = Config::load("configs/model_parameters.yaml")?;
//! let data = DataPipeline::from_config(&config)?.run()?;
//! let run_id = RunId::generate();
//! TrainingPipeline::from_config(&config)?.run::<TrainingBackend>(&data, &run_id, default_device())?;
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod download;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod run_id;
pub mod tracking;
pub mod training;
pub mod utils;

pub use artifact::{DataIngestionArtifact, ModelTrainerArtifact};
pub use config::Config;
pub use dataset::{DataIngestor, DataPreprocessor, DataValidator};
pub use inference::Predictor;
pub use model::{Model, ModelKind};
pub use pipeline::{DataPipeline, TrainingPipeline};
pub use run_id::RunId;
pub use tracking::{ExperimentTracker, FileTracker};
pub use training::{ModelEvaluator, ModelTrainer};
pub use utils::error::{PipelineError, Result};

/// Input shape `(height, width, channels)` every trained model is built with
pub const DEFAULT_INPUT_SHAPE: (usize, usize, usize) = (224, 224, 3);

/// Directory for process logs
pub const LOG_DIR: &str = "logs";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
