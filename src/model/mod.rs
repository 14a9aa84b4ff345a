//! Model Module
//!
//! Two classifier variants behind one network enum, plus the record/sidecar
//! persistence shared by checkpoints and the predictor.
//!
//! - `cnn`: three-stage CNN trained from scratch
//! - `vgg16`: VGG16 backbone with a new dense head and partial unfreeze
//! - `classifier`: the build → compile → fit lifecycle

pub mod classifier;
pub mod cnn;
pub mod vgg16;

pub use classifier::{CompileOptions, Model, ModelState, ModelStatus};
pub use cnn::{SimpleCnn, SimpleCnnConfig};
pub use vgg16::{Vgg16Config, Vgg16Transfer};

use std::fmt;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TransferLearningParams;
use crate::utils::error::{PipelineError, Result};

/// Which architecture to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SimpleCnn,
    Vgg16,
}

impl ModelKind {
    /// `"vgg16"` (any case) selects transfer learning; anything else the simple CNN
    pub fn from_discriminator(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("vgg16") {
            ModelKind::Vgg16
        } else {
            ModelKind::SimpleCnn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SimpleCnn => "simple_cnn",
            ModelKind::Vgg16 => "vgg16",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to rebuild a network before loading its record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub kind: ModelKind,
    /// `(height, width, channels)`
    pub input_shape: (usize, usize, usize),
    pub num_classes: usize,
    #[serde(default)]
    pub class_names: Vec<String>,
    pub created_at: String,
}

impl ModelMetadata {
    pub fn new(kind: ModelKind, input_shape: (usize, usize, usize), num_classes: usize) -> Self {
        Self {
            kind,
            input_shape,
            num_classes,
            class_names: Vec::new(),
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// Values per image in CHW layout
    pub fn pixels_per_image(&self) -> usize {
        let (h, w, c) = self.input_shape;
        h * w * c
    }
}

#[derive(Module, Debug)]
pub enum ClassifierNetwork<B: Backend> {
    SimpleCnn(SimpleCnn<B>),
    Vgg16(Vgg16Transfer<B>),
}

impl<B: Backend> ClassifierNetwork<B> {
    /// Construct the architecture described by `metadata`
    pub fn build(
        metadata: &ModelMetadata,
        transfer: &TransferLearningParams,
        device: &B::Device,
    ) -> Result<Self> {
        let (height, width, channels) = metadata.input_shape;
        if metadata.num_classes == 0 {
            return Err(PipelineError::Configuration(
                "num_classes must be at least 1".to_string(),
            ));
        }

        match metadata.kind {
            ModelKind::SimpleCnn => {
                let network = SimpleCnnConfig::new(metadata.num_classes, height, width)
                    .with_in_channels(channels)
                    .init(device)?;
                Ok(ClassifierNetwork::SimpleCnn(network))
            }
            ModelKind::Vgg16 => {
                if channels != 3 {
                    return Err(PipelineError::Configuration(format!(
                        "VGG16 expects 3 input channels, got {}",
                        channels
                    )));
                }
                let network = Vgg16Config::new(metadata.num_classes)
                    .with_freeze_base_model(transfer.freeze_base_model)
                    .with_unfreeze_last_n_layers(transfer.unfreeze_last_n_layers)
                    .init(transfer.weights_path.as_deref(), device)?;
                Ok(ClassifierNetwork::Vgg16(network))
            }
        }
    }

    /// Unnormalised class scores `[batch, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            ClassifierNetwork::SimpleCnn(network) => network.forward(images),
            ClassifierNetwork::Vgg16(network) => network.forward(images),
        }
    }
}

/// Extension of network records
pub const RECORD_EXTENSION: &str = "mpk";

/// Extension of the metadata sidecar
pub const SIDECAR_EXTENSION: &str = "json";

/// Record file for a model path.
///
/// A model path is either a base (`artifacts/model/<run_id>`) or the record
/// or sidecar itself. Only a trailing `.mpk`/`.json` is dropped before the
/// extension is appended, so dots inside a run id are kept.
pub fn record_path(path: &Path) -> PathBuf {
    with_model_extension(path, RECORD_EXTENSION)
}

/// Metadata sidecar next to the record
pub fn sidecar_path(path: &Path) -> PathBuf {
    with_model_extension(path, SIDECAR_EXTENSION)
}

fn with_model_extension(path: &Path, extension: &str) -> PathBuf {
    let base = match path.extension().and_then(|e| e.to_str()) {
        Some(RECORD_EXTENSION) | Some(SIDECAR_EXTENSION) => path.with_extension(""),
        _ => path.to_path_buf(),
    };
    let mut file_name = base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    file_name.push(".");
    file_name.push(extension);
    base.with_file_name(file_name)
}

/// Write the network record and its metadata sidecar; returns the record path
pub fn save_network<B: Backend>(
    network: &ClassifierNetwork<B>,
    metadata: &ModelMetadata,
    path: &Path,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    network
        .clone()
        .save_file(record_path(path), &recorder)
        .map_err(|e| PipelineError::Recorder(format!("failed to save {:?}: {:?}", path, e)))?;
    std::fs::write(sidecar_path(path), serde_json::to_string_pretty(metadata)?)?;

    Ok(record_path(path))
}

/// Rebuild a network from a record written by [`save_network`]
pub fn load_network<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(ClassifierNetwork<B>, ModelMetadata)> {
    let record = record_path(path);
    let sidecar = sidecar_path(path);
    if !record.exists() {
        return Err(PipelineError::not_found(record));
    }
    if !sidecar.exists() {
        return Err(PipelineError::not_found(sidecar));
    }

    let metadata: ModelMetadata = serde_json::from_str(&std::fs::read_to_string(&sidecar)?)?;
    let transfer = TransferLearningParams {
        freeze_base_model: false,
        ..TransferLearningParams::default()
    };
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let network = ClassifierNetwork::build(&metadata, &transfer, device)?
        .load_file(record.clone(), &recorder, device)
        .map_err(|e| PipelineError::Recorder(format!("failed to load {:?}: {:?}", record, e)))?;

    info!(
        "Loaded {} model ({} classes) from {:?}",
        metadata.kind, metadata.num_classes, record
    );
    Ok((network, metadata))
}
