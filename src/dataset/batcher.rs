//! Tensor batching
//!
//! Turns CPU-side image batches into `[batch, 3, height, width]` float tensors
//! and `[batch]` integer targets on one device.

use burn::prelude::*;

use crate::dataset::ingestion::ImageBatch;

#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// Uploads batches to the device it was created for
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Upload a pre-assembled batch in one transfer
    pub fn batch(&self, batch: &ImageBatch) -> ClassificationBatch<B> {
        let images = Tensor::<B, 1>::from_floats(batch.images.as_slice(), &self.device)
            .reshape([batch.len(), 3, batch.height, batch.width]);
        let targets: Vec<i64> = batch.labels.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);
        ClassificationBatch { images, targets }
    }
}
