//! Data ingestion
//!
//! Scans class-folder trees into `(path, label)` samples and groups them into
//! fixed-size batches. Only image headers are read up front; pixels are
//! decoded and resized one batch at a time whenever a batch is requested, so
//! memory stays bounded by the batches in flight. Pixel values stay in the
//! raw `0..=255` range; scaling belongs to preprocessing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::Dataset;
use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::dataset::{is_image_file, list_class_dirs, load_chw};
use crate::utils::error::{PipelineError, Result};

/// A single decoded example
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// CHW pixels, `3 * height * width` values
    pub image: Vec<f32>,
    pub label: usize,
}

/// A contiguous batch of examples sharing one image size
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    /// Concatenated CHW images
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    pub height: usize,
    pub width: usize,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn pixels_per_image(&self) -> usize {
        3 * self.height * self.width
    }
}

/// Where the pixels of one example come from
#[derive(Debug, Clone)]
enum ImageSource {
    /// Decoded and resized every time it is read
    File(PathBuf),
    /// CHW pixels already at the dataset's image size
    Decoded(Arc<[f32]>),
}

#[derive(Debug, Clone)]
struct Sample {
    source: ImageSource,
    label: usize,
}

/// Ordered examples read in fixed-size batches (the last may be short)
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<Sample>,
    batch_size: usize,
    image_size: (usize, usize),
}

impl ImageDataset {
    /// Examples backed by image files, decoded on demand
    pub fn from_files(files: Vec<(PathBuf, usize)>, image_size: (usize, usize), batch_size: usize) -> Self {
        let samples = files
            .into_iter()
            .map(|(path, label)| Sample {
                source: ImageSource::File(path),
                label,
            })
            .collect();
        Self::new(samples, image_size, batch_size)
    }

    /// Examples whose pixels are already in memory
    pub fn from_items(items: Vec<ImageItem>, image_size: (usize, usize), batch_size: usize) -> Self {
        let samples = items
            .into_iter()
            .map(|item| Sample {
                source: ImageSource::Decoded(item.image.into()),
                label: item.label,
            })
            .collect();
        Self::new(samples, image_size, batch_size)
    }

    fn new(samples: Vec<Sample>, image_size: (usize, usize), batch_size: usize) -> Self {
        Self {
            samples,
            batch_size: batch_size.max(1),
            image_size,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `(height, width)`
    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    /// Labels in example order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Decode batch `index`, images in parallel
    pub fn load_batch(&self, index: usize) -> Result<ImageBatch> {
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.samples.len());
        if start >= end {
            return Err(PipelineError::Inconsistency(format!(
                "batch {} is out of range ({} batches)",
                index,
                self.num_batches()
            )));
        }

        let chunk = &self.samples[start..end];
        let images = chunk
            .par_iter()
            .map(|sample| self.read(sample))
            .collect::<Result<Vec<_>>>()?;
        let (height, width) = self.image_size;
        Ok(ImageBatch {
            images: images.concat(),
            labels: chunk.iter().map(|s| s.label).collect(),
            height,
            width,
        })
    }

    fn read(&self, sample: &Sample) -> Result<Vec<f32>> {
        match &sample.source {
            ImageSource::File(path) => load_chw(path, self.image_size, 1.0),
            ImageSource::Decoded(pixels) => Ok(pixels.to_vec()),
        }
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        match self.read(sample) {
            Ok(image) => Some(ImageItem {
                image,
                label: sample.label,
            }),
            Err(e) => {
                warn!("Example {} could not be read: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Builds the train and test datasets described by `data_config`
#[derive(Debug, Clone)]
pub struct DataIngestor {
    train_dir: PathBuf,
    test_dir: PathBuf,
    image_size: (usize, usize),
    batch_size: usize,
    seed: u64,
}

impl DataIngestor {
    pub fn new(
        train_dir: impl Into<PathBuf>,
        test_dir: impl Into<PathBuf>,
        image_size: (usize, usize),
        batch_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            train_dir: train_dir.into(),
            test_dir: test_dir.into(),
            image_size,
            batch_size,
            seed,
        }
    }

    /// Fails with a configuration error when `data_config` keys are absent
    pub fn from_config(config: &Config) -> Result<Self> {
        let data = config.data()?;
        if data.batch_size == 0 || data.img_size.0 == 0 || data.img_size.1 == 0 {
            return Err(PipelineError::Configuration(
                "BATCH_SIZE and IMG_SIZE must be positive".to_string(),
            ));
        }
        Ok(Self::new(
            data.train_dir,
            data.test_dir,
            data.img_size,
            data.batch_size,
            data.seed,
        ))
    }

    /// Returns `(train, test, class_names, num_classes)`.
    ///
    /// Class names are the sorted subdirectory names of the training root.
    /// Training examples are shuffled with the configured seed; test
    /// examples keep directory order.
    pub fn load(&self) -> Result<(ImageDataset, ImageDataset, Vec<String>, usize)> {
        info!("Ingesting images from {:?} and {:?}", self.train_dir, self.test_dir);

        let class_names = list_class_dirs(&self.train_dir)?;
        let test_classes = list_class_dirs(&self.test_dir)?;
        if class_names != test_classes {
            return Err(PipelineError::Inconsistency(format!(
                "Train/Test class mismatch: {:?} vs {:?}",
                class_names, test_classes
            )));
        }

        let mut train_samples = scan_samples(&self.train_dir, &class_names, true)?;
        let test_samples = scan_samples(&self.test_dir, &class_names, false)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        train_samples.shuffle(&mut rng);

        self.check_readable(&train_samples, "train")?;
        self.check_readable(&test_samples, "test")?;

        let train = ImageDataset::from_files(train_samples, self.image_size, self.batch_size);
        let test = ImageDataset::from_files(test_samples, self.image_size, self.batch_size);

        info!(
            "Indexed {} train / {} test images across {} classes",
            train.len(),
            test.len(),
            class_names.len()
        );

        let num_classes = class_names.len();
        Ok((train, test, class_names, num_classes))
    }

    /// Read every image header so unreadable files fail here rather than
    /// mid-training
    fn check_readable(&self, samples: &[(PathBuf, usize)], split: &str) -> Result<()> {
        let pb = ProgressBar::new(samples.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message(format!("checking {}", split));

        let result = samples.par_iter().try_for_each(|(path, _)| {
            ImageReader::open(path)
                .and_then(|reader| reader.with_guessed_format())
                .map_err(|e| PipelineError::Image(path.clone(), e.to_string()))?
                .into_dimensions()
                .map_err(|e| PipelineError::Image(path.clone(), e.to_string()))?;
            pb.inc(1);
            Ok(())
        });

        pb.finish_and_clear();
        result
    }
}

/// `(path, label)` for every image file directly inside each class folder.
/// With `require_images`, a class folder without image files is an
/// inconsistency.
fn scan_samples(root: &Path, class_names: &[String], require_images: bool) -> Result<Vec<(PathBuf, usize)>> {
    let mut samples = Vec::new();
    for (label, class) in class_names.iter().enumerate() {
        let before = samples.len();
        for entry in WalkDir::new(root.join(class))
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PipelineError::Io(e.into()))?;
            if entry.file_type().is_file() && is_image_file(entry.path()) {
                samples.push((entry.into_path(), label));
            }
        }
        let count = samples.len() - before;
        if require_images && count == 0 {
            return Err(PipelineError::Inconsistency(format!(
                "class '{}' under {:?} has no images",
                class, root
            )));
        }
        debug!("Class '{}' (label {}): {} images", class, label, count);
    }
    Ok(samples)
}
