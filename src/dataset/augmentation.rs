//! Data Augmentation
//!
//! Random horizontal flip, rotation and zoom applied to CHW `f32` images.
//! All three are folded into one inverse mapping per image, sampled with
//! bilinear interpolation and reflect padding, so the output always has the
//! input's shape.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::AugmentationParams;
use crate::dataset::ingestion::ImageBatch;

/// Augmentation settings
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentationConfig {
    /// Probability of a horizontal flip
    pub flip_prob: f32,
    /// Maximum rotation as a fraction of a full turn (0.1 = ±36°)
    pub rotation: f32,
    /// Maximum zoom fraction (0.1 = scale in [0.9, 1.1])
    pub zoom: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip_prob: 0.5,
            rotation: 0.1,
            zoom: 0.1,
        }
    }
}

impl From<&AugmentationParams> for AugmentationConfig {
    fn from(params: &AugmentationParams) -> Self {
        Self {
            rotation: params.rotation.abs(),
            zoom: params.zoom.abs().min(0.99),
            ..Self::default()
        }
    }
}

/// Randomly drawn parameters for one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub flip: bool,
    /// Radians
    pub angle: f32,
    /// Sampling scale; above 1 zooms out, below 1 zooms in
    pub scale: f32,
}

impl AffineParams {
    pub const IDENTITY: Self = Self {
        flip: false,
        angle: 0.0,
        scale: 1.0,
    };
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    pub fn sample_params(&self, rng: &mut impl Rng) -> AffineParams {
        let flip = rng.gen::<f32>() < self.config.flip_prob;
        let max_angle = self.config.rotation * std::f32::consts::TAU;
        let angle = if max_angle > 0.0 {
            rng.gen_range(-max_angle..=max_angle)
        } else {
            0.0
        };
        let scale = if self.config.zoom > 0.0 {
            rng.gen_range(1.0 - self.config.zoom..=1.0 + self.config.zoom)
        } else {
            1.0
        };
        AffineParams { flip, angle, scale }
    }

    /// Augment every image of the batch in parallel. Labels are untouched.
    pub fn apply_batch(&self, batch: &mut ImageBatch, rng: &mut ChaCha8Rng) {
        let (height, width) = (batch.height, batch.width);
        let n = batch.pixels_per_image();
        let seeds: Vec<u64> = (0..batch.len()).map(|_| rng.gen()).collect();

        batch
            .images
            .par_chunks_mut(n)
            .zip(seeds.par_iter())
            .for_each(|(image, &seed)| {
                let mut image_rng = ChaCha8Rng::seed_from_u64(seed);
                let params = self.sample_params(&mut image_rng);
                let out = warp(image, height, width, params);
                image.copy_from_slice(&out);
            });
    }
}

/// Resample a CHW image under `params`
pub fn warp(image: &[f32], height: usize, width: usize, params: AffineParams) -> Vec<f32> {
    if params == AffineParams::IDENTITY {
        return image.to_vec();
    }

    let plane = height * width;
    let channels = image.len() / plane.max(1);
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin, cos) = params.angle.sin_cos();

    let mut out = vec![0.0f32; image.len()];
    for y in 0..height {
        for x in 0..width {
            let x_out = if params.flip { width - 1 - x } else { x };
            let dx = x_out as f32 - cx;
            let dy = y as f32 - cy;

            // Inverse rotation, then scale about the centre
            let sx = (cos * dx + sin * dy) * params.scale + cx;
            let sy = (-sin * dx + cos * dy) * params.scale + cy;

            for c in 0..channels {
                let src = &image[c * plane..(c + 1) * plane];
                out[c * plane + y * width + x] = bilinear(src, height, width, sx, sy);
            }
        }
    }
    out
}

fn bilinear(plane: &[f32], height: usize, width: usize, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let xa = reflect(x0 as i64, width);
    let xb = reflect(x0 as i64 + 1, width);
    let ya = reflect(y0 as i64, height);
    let yb = reflect(y0 as i64 + 1, height);

    let p00 = plane[ya * width + xa];
    let p10 = plane[ya * width + xb];
    let p01 = plane[yb * width + xa];
    let p11 = plane[yb * width + xb];

    p00 * (1.0 - fx) * (1.0 - fy) + p10 * fx * (1.0 - fy) + p01 * (1.0 - fx) * fy + p11 * fx * fy
}

/// Mirror an index into `0..n` (`d c b a | a b c d | d c b a`)
fn reflect(i: i64, n: usize) -> usize {
    let n = n as i64;
    if n <= 1 {
        return 0;
    }
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}
