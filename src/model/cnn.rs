//! Simple CNN trained from scratch
//!
//! Three convolution stages with increasing depth (32 → 64 → 128), each a
//! 3×3 valid convolution, ReLU and 2×2 max-pool, followed by a dense hidden
//! layer and the class layer.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::{self, PipelineError};

/// Channel depth of each convolution stage
pub const STAGE_CHANNELS: [usize; 3] = [32, 64, 128];

#[derive(Config, Debug)]
pub struct SimpleCnnConfig {
    pub num_classes: usize,
    pub height: usize,
    pub width: usize,
    #[config(default = "3")]
    pub in_channels: usize,
    #[config(default = "128")]
    pub hidden_units: usize,
}

impl SimpleCnnConfig {
    /// Spatial size after the three stages, or `None` if the input is too small
    pub fn feature_map_size(&self) -> Option<(usize, usize)> {
        let stage = |s: usize| s.checked_sub(2).map(|v| v / 2).filter(|&v| v > 0);
        let h = stage(self.height).and_then(stage).and_then(stage)?;
        let w = stage(self.width).and_then(stage).and_then(stage)?;
        Some((h, w))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<SimpleCnn<B>> {
        let (h, w) = self.feature_map_size().ok_or_else(|| {
            PipelineError::Configuration(format!(
                "input {}x{} is too small for three conv/pool stages",
                self.height, self.width
            ))
        })?;

        let [c1, c2, c3] = STAGE_CHANNELS;
        Ok(SimpleCnn {
            conv1: conv(self.in_channels, c1, device),
            conv2: conv(c1, c2, device),
            conv3: conv(c2, c3, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            hidden: LinearConfig::new(c3 * h * w, self.hidden_units).init(device),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        })
    }
}

fn conv<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Valid)
        .init(device)
}

#[derive(Module, Debug)]
pub struct SimpleCnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
    pub hidden: Linear<B>,
    pub output: Linear<B>,
}

impl<B: Backend> SimpleCnn<B> {
    /// `[batch, 3, H, W]` → logits `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.activation.forward(self.hidden.forward(x));
        self.output.forward(x)
    }
}
