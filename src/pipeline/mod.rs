//! Pipeline orchestration
//!
//! - `data`: validate → ingest → preprocess
//! - `training`: train → evaluate → plot

pub mod data;
pub mod training;

pub use data::DataPipeline;
pub use training::{TrainingOutcome, TrainingPipeline};
