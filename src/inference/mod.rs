//! Inference module

pub mod predictor;

pub use predictor::{PredictionResult, Predictor};
