//! Training Module
//!
//! - `history`: per-epoch metric record
//! - `hooks`: early stopping and best-checkpoint hooks run after each epoch
//! - `trainer`: builds, trains and tracks a model for one run
//! - `evaluator`: classification report and training curves

pub mod evaluator;
pub mod history;
pub mod hooks;
pub mod trainer;

pub use evaluator::ModelEvaluator;
pub use history::{EpochMetrics, TrainingHistory};
pub use hooks::{BestCheckpoint, EarlyStopping, EpochContext, TrainingControl, TrainingHook};
pub use trainer::{ModelTrainer, TrainerState};
