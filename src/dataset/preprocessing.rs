//! Preprocessing
//!
//! Scales pixels to `[0, 1]` on both splits and, when enabled, augments the
//! training split only. A producer thread decodes each batch from disk,
//! transforms it, and keeps a bounded look-ahead buffer filled, so only the
//! batches in flight are ever held in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use crate::config::{AugmentationParams, Config};
use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::ingestion::{ImageBatch, ImageDataset};
use crate::utils::error::Result;

/// Fixed pixel scale for both splits
pub const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// Default number of batches buffered ahead of the consumer
pub const DEFAULT_PREFETCH: usize = 2;

/// Per-batch map applied on every pass
#[derive(Debug, Clone)]
pub enum BatchTransform {
    Normalize,
    NormalizeAndAugment { augmenter: Augmenter, seed: u64 },
}

impl BatchTransform {
    /// `pass` and `index` select the augmentation randomness, so two passes
    /// over the same batch differ while a given `(pass, index)` is reproducible.
    pub fn apply(&self, mut batch: ImageBatch, pass: u64, index: usize) -> ImageBatch {
        batch.images.par_iter_mut().for_each(|v| *v *= PIXEL_SCALE);

        if let BatchTransform::NormalizeAndAugment { augmenter, seed } = self {
            let mixed = seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(pass.wrapping_mul(0xBF58_476D_1CE4_E5B9))
                .wrapping_add(index as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(mixed);
            augmenter.apply_batch(&mut batch, &mut rng);
        }
        batch
    }

    pub fn is_augmenting(&self) -> bool {
        matches!(self, BatchTransform::NormalizeAndAugment { .. })
    }
}

/// A split paired with its transform; iterate with [`PreparedDataset::iter`]
#[derive(Debug)]
pub struct PreparedDataset {
    source: Arc<ImageDataset>,
    transform: BatchTransform,
    prefetch: usize,
    passes: AtomicU64,
}

impl PreparedDataset {
    pub fn new(source: ImageDataset, transform: BatchTransform, prefetch: usize) -> Self {
        Self {
            source: Arc::new(source),
            transform,
            prefetch: prefetch.max(1),
            passes: AtomicU64::new(0),
        }
    }

    /// Start a new pass. Batches are decoded and transformed on a background
    /// thread and handed over through a bounded channel. A decode failure is
    /// yielded as an error and ends the pass.
    pub fn iter(&self) -> BatchStream {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(self.prefetch);
        let source = Arc::clone(&self.source);
        let transform = self.transform.clone();

        thread::spawn(move || {
            for index in 0..source.num_batches() {
                let out = source
                    .load_batch(index)
                    .map(|batch| transform.apply(batch, pass, index));
                let failed = out.is_err();
                if sender.send(out).is_err() || failed {
                    break;
                }
            }
        });

        BatchStream { receiver }
    }

    pub fn source(&self) -> &ImageDataset {
        &self.source
    }

    pub fn transform(&self) -> &BatchTransform {
        &self.transform
    }

    pub fn num_batches(&self) -> usize {
        self.source.num_batches()
    }

    pub fn len(&self) -> usize {
        use burn::data::dataset::Dataset;
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_size(&self) -> (usize, usize) {
        self.source.image_size()
    }
}

/// Iterator over one pass of a [`PreparedDataset`]
pub struct BatchStream {
    receiver: Receiver<Result<ImageBatch>>,
}

impl Iterator for BatchStream {
    type Item = Result<ImageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

#[derive(Debug, Clone)]
pub struct DataPreprocessor {
    augmentation: AugmentationParams,
    seed: u64,
    prefetch: usize,
}

impl DataPreprocessor {
    pub fn new(augmentation: AugmentationParams, seed: u64) -> Self {
        Self {
            augmentation,
            seed,
            prefetch: DEFAULT_PREFETCH,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.augmentation()?, config.data()?.seed))
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Returns the transformed `(train, test)` pair. The test split is only
    /// ever normalized.
    pub fn process(&self, train: ImageDataset, test: ImageDataset) -> (PreparedDataset, PreparedDataset) {
        let train_transform = if self.augmentation.enabled {
            info!(
                "Augmenting training split: flip, rotation {:.2}, zoom {:.2}",
                self.augmentation.rotation, self.augmentation.zoom
            );
            BatchTransform::NormalizeAndAugment {
                augmenter: Augmenter::new(AugmentationConfig::from(&self.augmentation)),
                seed: self.seed,
            }
        } else {
            BatchTransform::Normalize
        };

        (
            PreparedDataset::new(train, train_transform, self.prefetch),
            PreparedDataset::new(test, BatchTransform::Normalize, self.prefetch),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ingestion::ImageItem;
    use crate::dataset::test_util::write_images;
    use crate::utils::error::PipelineError;

    fn dataset(n: usize) -> ImageDataset {
        let items = (0..n)
            .map(|i| ImageItem {
                image: (0..3 * 4 * 4).map(|p| ((p * 7 + i * 13) % 256) as f32).collect(),
                label: i % 2,
            })
            .collect();
        ImageDataset::from_items(items, (4, 4), 2)
    }

    fn params(enabled: bool) -> AugmentationParams {
        AugmentationParams {
            enabled,
            rotation: 0.2,
            zoom: 0.2,
        }
    }

    #[test]
    fn test_normalization_is_repeatable() {
        let (train, _) = DataPreprocessor::new(params(false), 1).process(dataset(5), dataset(2));
        let first: Vec<ImageBatch> = train.iter().collect::<Result<_>>().unwrap();
        let second: Vec<ImageBatch> = train.iter().collect::<Result<_>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().flat_map(|b| b.images.iter()).all(|&v| v >= 0.0 && v <= 1.0 + 1e-6));
    }

    #[test]
    fn test_augmented_passes_differ_but_keep_structure() {
        let (train, _) = DataPreprocessor::new(params(true), 1).process(dataset(5), dataset(2));
        let first: Vec<ImageBatch> = train.iter().collect::<Result<_>>().unwrap();
        let second: Vec<ImageBatch> = train.iter().collect::<Result<_>>().unwrap();

        assert_ne!(first, second);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.images.len(), b.images.len());
            assert_eq!(a.labels, b.labels);
        }
        let source_labels = train.source().labels();
        let seen: Vec<usize> = first.iter().flat_map(|b| b.labels.clone()).collect();
        assert_eq!(source_labels, seen);
    }

    #[test]
    fn test_test_split_never_augmented() {
        let input = dataset(3);
        let expected: Vec<Vec<f32>> = (0..input.num_batches())
            .map(|i| input.load_batch(i).unwrap().images.iter().map(|v| v * PIXEL_SCALE).collect())
            .collect();

        for enabled in [false, true] {
            let (_, test) = DataPreprocessor::new(params(enabled), 5).process(dataset(1), input.clone());
            assert!(!test.transform().is_augmenting());
            let got: Vec<Vec<f32>> = test.iter().map(|b| b.unwrap().images).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_dropping_stream_early_does_not_block() {
        let (train, _) = DataPreprocessor::new(params(false), 1)
            .with_prefetch(1)
            .process(dataset(20), dataset(1));
        let mut stream = train.iter();
        assert!(stream.next().is_some());
        drop(stream);
        assert_eq!(train.iter().count(), 10);
    }

    #[test]
    fn test_batches_stream_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        write_images(dir.path(), 3, [200, 100, 50]);
        let files = (0..3)
            .map(|i| (dir.path().join(format!("img_{}.png", i)), i % 2))
            .collect();
        let (train, _) = DataPreprocessor::new(params(false), 1)
            .process(ImageDataset::from_files(files, (4, 4), 2), dataset(1));

        let batches: Vec<ImageBatch> = train.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].images.len(), 2 * 3 * 4 * 4);
        assert!((batches[1].images[0] - 200.0 * PIXEL_SCALE).abs() < 1e-6);

        std::fs::remove_file(dir.path().join("img_2.png")).unwrap();
        let mut stream = train.iter();
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(stream.next(), Some(Err(PipelineError::Image(_, _)))));
        assert!(stream.next().is_none());
    }
}
