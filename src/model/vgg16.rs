//! VGG16 transfer-learning classifier
//!
//! The 13-layer VGG16 convolutional backbone without its dense top, followed
//! by global average pooling, a 256-unit ReLU layer, dropout and the class
//! layer. Backbone weights can be loaded from a pretrained record and the
//! backbone frozen except for its trailing `unfreeze_last_n_layers` layers.
//! That count walks the backbone from the end and includes the pooling
//! layer closing each block, so `4` unfreezes the last pool and the three
//! convolutions of block 5.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use tracing::{info, warn};

use crate::utils::error::{self, PipelineError};

/// Output channels of each backbone block; a max-pool closes every block
pub const BLOCKS: [(usize, usize); 5] = [(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)];

/// Total convolution layers in the backbone
pub const NUM_CONV_LAYERS: usize = 13;

#[derive(Config, Debug)]
pub struct Vgg16Config {
    pub num_classes: usize,
    #[config(default = "true")]
    pub freeze_base_model: bool,
    #[config(default = "0")]
    pub unfreeze_last_n_layers: usize,
    #[config(default = "256")]
    pub hidden_units: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl Vgg16Config {
    /// Number of leading convolutions that stay frozen.
    ///
    /// `unfreeze_last_n_layers` counts backbone layers from the end, pools
    /// included; pools carry no weights, so only the convolutions among
    /// those trailing layers become trainable.
    pub fn frozen_layers(&self) -> usize {
        if !self.freeze_base_model {
            return 0;
        }
        let trainable_convs = BLOCKS
            .iter()
            .rev()
            .flat_map(|&(convs, _)| std::iter::once(false).chain(std::iter::repeat(true).take(convs)))
            .take(self.unfreeze_last_n_layers)
            .filter(|&is_conv| is_conv)
            .count();
        NUM_CONV_LAYERS - trainable_convs
    }

    /// Build the classifier. When `weights` is given the backbone is loaded
    /// from that record before the freeze policy is applied.
    pub fn init<B: Backend>(&self, weights: Option<&Path>, device: &B::Device) -> error::Result<Vgg16Transfer<B>> {
        let mut backbone = Vgg16Backbone::new(device);

        match weights {
            Some(path) => {
                let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
                backbone = backbone
                    .load_file(path.to_path_buf(), &recorder, device)
                    .map_err(|e| PipelineError::Recorder(format!("pretrained weights {:?}: {:?}", path, e)))?;
                info!("Loaded pretrained backbone from {:?}", path);
            }
            None => warn!("No pretrained backbone configured; VGG16 backbone starts from random weights"),
        }

        let frozen = self.frozen_layers();
        backbone.convs = backbone
            .convs
            .into_iter()
            .enumerate()
            .map(|(i, conv)| if i < frozen { conv.no_grad() } else { conv })
            .collect();
        info!(
            "VGG16 backbone: {} frozen / {} trainable convolution layers",
            frozen,
            NUM_CONV_LAYERS - frozen
        );

        let (_, last_channels) = BLOCKS[BLOCKS.len() - 1];
        Ok(Vgg16Transfer {
            backbone,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(last_channels, self.hidden_units).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        })
    }
}

/// Convolutional feature extractor
#[derive(Module, Debug)]
pub struct Vgg16Backbone<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> Vgg16Backbone<B> {
    pub fn new(device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(NUM_CONV_LAYERS);
        let mut in_channels = 3;
        for (layers, out_channels) in BLOCKS {
            for _ in 0..layers {
                convs.push(
                    Conv2dConfig::new([in_channels, out_channels], [3, 3])
                        .with_padding(PaddingConfig2d::Same)
                        .init(device),
                );
                in_channels = out_channels;
            }
        }
        Self {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        let mut layer = 0;
        for (layers, _) in BLOCKS {
            for conv in &self.convs[layer..layer + layers] {
                x = self.activation.forward(conv.forward(x));
            }
            layer += layers;
            x = self.pool.forward(x);
        }
        x
    }
}

#[derive(Module, Debug)]
pub struct Vgg16Transfer<B: Backend> {
    pub backbone: Vgg16Backbone<B>,
    global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    activation: Relu,
    dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> Vgg16Transfer<B> {
    /// `[batch, 3, H, W]` → logits `[batch, num_classes]`; H and W must be at least 32
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(x);
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_frozen_layer_count() {
        assert_eq!(Vgg16Config::new(2).frozen_layers(), 13);
        // the block 5 pool only
        assert_eq!(Vgg16Config::new(2).with_unfreeze_last_n_layers(1).frozen_layers(), 13);
        // block 5 pool and its three convolutions
        assert_eq!(Vgg16Config::new(2).with_unfreeze_last_n_layers(4).frozen_layers(), 10);
        // through the block 4 pool and its convolutions
        assert_eq!(Vgg16Config::new(2).with_unfreeze_last_n_layers(8).frozen_layers(), 7);
        assert_eq!(Vgg16Config::new(2).with_unfreeze_last_n_layers(40).frozen_layers(), 0);
        assert_eq!(Vgg16Config::new(2).with_freeze_base_model(false).frozen_layers(), 0);
    }

    #[test]
    fn test_backbone_layout() {
        let device = Default::default();
        let backbone = Vgg16Backbone::<TestBackend>::new(&device);
        assert_eq!(backbone.convs.len(), NUM_CONV_LAYERS);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = Vgg16Config::new(4).init::<TestBackend>(None, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 4]);
    }

    #[test]
    fn test_partial_unfreeze_limits_trainable_params() {
        type AdBackend = Autodiff<NdArray>;
        let device = Default::default();

        let all_trainable = Vgg16Config::new(2)
            .with_freeze_base_model(false)
            .init::<AdBackend>(None, &device)
            .unwrap();
        let partly_frozen = Vgg16Config::new(2)
            .with_unfreeze_last_n_layers(3)
            .init::<AdBackend>(None, &device)
            .unwrap();

        let frozen_conv = &partly_frozen.backbone.convs[0];
        let trainable_conv = &partly_frozen.backbone.convs[12];
        assert!(!frozen_conv.weight.val().is_require_grad());
        assert!(trainable_conv.weight.val().is_require_grad());
        assert!(all_trainable.backbone.convs[0].weight.val().is_require_grad());
    }

    #[test]
    fn test_missing_weights_file() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let result = Vgg16Config::new(2).init::<TestBackend>(Some(&dir.path().join("nope")), &device);
        assert!(matches!(result, Err(PipelineError::Recorder(_))));
    }
}
