//! Dataset module
//!
//! - `validation`: structural checks on the train/test directory trees
//! - `ingestion`: indexing class-folder trees into batched datasets decoded on demand
//! - `augmentation`: random flip/rotation/zoom on CHW image buffers
//! - `preprocessing`: normalization, train-only augmentation and prefetching
//! - `batcher`: conversion of CPU batches into Burn tensors
//!
//! Images are stored channels-first (`[3, H, W]`) as flat `f32` buffers.

pub mod augmentation;
pub mod batcher;
pub mod ingestion;
pub mod preprocessing;
pub mod validation;

use std::path::Path;

use image::imageops::FilterType;
use image::ImageReader;

use crate::utils::error::{PipelineError, Result};

pub use batcher::{ClassificationBatch, ImageBatcher};
pub use ingestion::{DataIngestor, ImageBatch, ImageDataset, ImageItem};
pub use preprocessing::{BatchTransform, DataPreprocessor, PreparedDataset};
pub use validation::DataValidator;

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Whether `path` has a recognised image extension (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Immediate subdirectory names of `root`, sorted lexicographically
pub fn list_class_dirs(root: &Path) -> Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    classes.sort();
    Ok(classes)
}

/// Decode an image, resize it to `(height, width)` and return CHW pixel
/// values scaled by `scale` (`1.0` keeps the raw 0..=255 range).
pub fn load_chw(path: &Path, size: (usize, usize), scale: f32) -> Result<Vec<f32>> {
    let (height, width) = size;
    let img = ImageReader::open(path)
        .map_err(|e| PipelineError::Image(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| PipelineError::Image(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| PipelineError::Image(path.to_path_buf(), e.to_string()))?
        .resize_exact(width as u32, height as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = height * width;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 * scale;
        }
    }
    Ok(data)
}
