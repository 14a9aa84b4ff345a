//! Single-image prediction

use std::path::Path;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::load_chw;
use crate::dataset::preprocessing::PIXEL_SCALE;
use crate::model::Model;
use crate::utils::error::{PipelineError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub class_index: usize,
    pub class_name: String,
    /// Softmax probability of the predicted class
    pub confidence: f32,
    pub probabilities: Vec<f32>,
    pub inference_time_ms: f64,
}

pub struct Predictor;

impl Predictor {
    /// Returns `(class_name, confidence)` for the image at `image_path`
    pub fn predict<B: AutodiffBackend>(
        model: &Model<B>,
        class_names: &[String],
        image_path: &Path,
    ) -> Result<(String, f32)> {
        let result = Self::predict_detailed(model, class_names, image_path)?;
        Ok((result.class_name, result.confidence))
    }

    pub fn predict_detailed<B: AutodiffBackend>(
        model: &Model<B>,
        class_names: &[String],
        image_path: &Path,
    ) -> Result<PredictionResult> {
        if !image_path.exists() {
            return Err(PipelineError::not_found(image_path));
        }
        let metadata = model.metadata().ok_or_else(PipelineError::model_not_built)?;
        let (height, width, _) = metadata.input_shape;

        let start = Instant::now();
        let pixels = load_chw(image_path, (height, width), PIXEL_SCALE)?;
        let probabilities = model
            .predict(&pixels, 1)?
            .into_iter()
            .next()
            .unwrap_or_default();

        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| PipelineError::State("model produced no outputs".to_string()))?;
        let class_name = class_names.get(class_index).cloned().ok_or_else(|| {
            PipelineError::Inconsistency(format!(
                "predicted class {} but only {} class names are known",
                class_index,
                class_names.len()
            ))
        })?;

        let result = PredictionResult {
            class_index,
            class_name,
            confidence,
            probabilities,
            inference_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            "{:?} → {} ({:.2}%) in {:.1} ms",
            image_path,
            result.class_name,
            result.confidence * 100.0,
            result.inference_time_ms
        );
        Ok(result)
    }
}
