//! Classifier lifecycle
//!
//! [`Model`] walks through `Unbuilt → Built → Compiled`. Building creates the
//! network, compiling records the optimizer/loss/metric names, and `fit`
//! resolves those names and runs the epoch loop.

use std::path::{Path, PathBuf};

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig},
    tensor::{activation::softmax, backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use tracing::{debug, info};

use crate::config::TransferLearningParams;
use crate::dataset::batcher::ImageBatcher;
use crate::dataset::preprocessing::PreparedDataset;
use crate::model::{load_network, save_network, ClassifierNetwork, ModelKind, ModelMetadata};
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::training::hooks::{EpochContext, TrainingControl, TrainingHook};
use crate::utils::error::{PipelineError, Result};
use crate::utils::logging::TrainingLogger;

/// Loss names that map onto cross-entropy over integer class targets
const CROSS_ENTROPY_LOSSES: [&str; 3] = [
    "sparse_categorical_crossentropy",
    "categorical_crossentropy",
    "cross_entropy",
];

/// Names recorded by `compile`; resolved only when `fit` runs
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub optimizer: String,
    pub loss: String,
    pub metrics: Vec<String>,
}

pub enum ModelState<B: Backend> {
    Unbuilt,
    Built {
        network: ClassifierNetwork<B>,
        metadata: ModelMetadata,
    },
    Compiled {
        network: ClassifierNetwork<B>,
        metadata: ModelMetadata,
        options: CompileOptions,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unbuilt,
    Built,
    Compiled,
}

impl<B: Backend> ModelState<B> {
    pub fn status(&self) -> ModelStatus {
        match self {
            ModelState::Unbuilt => ModelStatus::Unbuilt,
            ModelState::Built { .. } => ModelStatus::Built,
            ModelState::Compiled { .. } => ModelStatus::Compiled,
        }
    }

    fn parts(&self) -> Option<(&ClassifierNetwork<B>, &ModelMetadata)> {
        match self {
            ModelState::Unbuilt => None,
            ModelState::Built { network, metadata } | ModelState::Compiled { network, metadata, .. } => {
                Some((network, metadata))
            }
        }
    }
}

pub struct Model<B: AutodiffBackend> {
    kind: ModelKind,
    transfer: TransferLearningParams,
    learning_rate: f64,
    device: B::Device,
    state: ModelState<B>,
}

impl<B: AutodiffBackend> Model<B> {
    pub fn new(kind: ModelKind, device: B::Device) -> Self {
        Self {
            kind,
            transfer: TransferLearningParams::default(),
            learning_rate: 1e-3,
            device,
            state: ModelState::Unbuilt,
        }
    }

    pub fn with_transfer_learning(mut self, transfer: TransferLearningParams) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn status(&self) -> ModelStatus {
        self.state.status()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.state.parts().map(|(_, metadata)| metadata)
    }

    pub fn network(&self) -> Option<&ClassifierNetwork<B>> {
        self.state.parts().map(|(network, _)| network)
    }

    pub fn class_names(&self) -> &[String] {
        self.metadata().map(|m| m.class_names.as_slice()).unwrap_or(&[])
    }

    /// Create the network for `input_shape = (height, width, channels)`
    pub fn build(&mut self, input_shape: (usize, usize, usize), num_classes: usize) -> Result<()> {
        let metadata = ModelMetadata::new(self.kind, input_shape, num_classes);
        let network = ClassifierNetwork::build(&metadata, &self.transfer, &self.device)?;
        info!(
            "Built {} for input {:?} with {} classes",
            self.kind, input_shape, num_classes
        );
        self.state = ModelState::Built { network, metadata };
        Ok(())
    }

    /// Record training settings. Names are not checked here.
    pub fn compile(&mut self, optimizer: &str, loss: &str, metrics: &[String]) -> Result<()> {
        let options = CompileOptions {
            optimizer: optimizer.to_string(),
            loss: loss.to_string(),
            metrics: metrics.to_vec(),
        };
        self.state = match std::mem::replace(&mut self.state, ModelState::Unbuilt) {
            ModelState::Unbuilt => return Err(PipelineError::model_not_built()),
            ModelState::Built { network, metadata } | ModelState::Compiled { network, metadata, .. } => {
                ModelState::Compiled { network, metadata, options }
            }
        };
        Ok(())
    }

    pub fn set_class_names(&mut self, class_names: Vec<String>) -> Result<()> {
        match &mut self.state {
            ModelState::Unbuilt => Err(PipelineError::model_not_built()),
            ModelState::Built { metadata, .. } | ModelState::Compiled { metadata, .. } => {
                metadata.class_names = class_names;
                Ok(())
            }
        }
    }

    /// Train for up to `epochs` passes over `train`. Hooks see every epoch
    /// and may stop the loop early.
    pub fn fit(
        &mut self,
        train: &PreparedDataset,
        validation: Option<&PreparedDataset>,
        epochs: usize,
        hooks: &mut [&mut dyn TrainingHook<B>],
    ) -> Result<TrainingHistory> {
        let (network, metadata, options) = match &self.state {
            ModelState::Unbuilt => return Err(PipelineError::model_not_built()),
            ModelState::Built { .. } => {
                return Err(PipelineError::State("model must be compiled before fit".to_string()))
            }
            ModelState::Compiled { network, metadata, options } => {
                (network.clone(), metadata.clone(), options.clone())
            }
        };

        resolve_loss(&options.loss)?;
        resolve_metrics(&options.metrics)?;
        check_input(train, &metadata)?;
        if let Some(validation) = validation {
            check_input(validation, &metadata)?;
        }
        if train.is_empty() {
            return Err(PipelineError::Inconsistency("training split is empty".to_string()));
        }

        let run = FitRun {
            train,
            validation,
            epochs,
            learning_rate: self.learning_rate,
            metadata: &metadata,
            device: &self.device,
        };
        let (network, history) = match options.optimizer.trim().to_lowercase().as_str() {
            "adam" => run.execute(network, AdamConfig::new().init(), hooks)?,
            "adamw" => run.execute(network, AdamWConfig::new().init(), hooks)?,
            "sgd" => run.execute(network, SgdConfig::new().init(), hooks)?,
            "rmsprop" => run.execute(network, RmsPropConfig::new().init(), hooks)?,
            other => {
                return Err(PipelineError::Configuration(format!("unknown optimizer '{}'", other)))
            }
        };

        self.state = ModelState::Compiled { network, metadata, options };
        Ok(history)
    }

    /// Class probabilities for `count` CHW images laid out back to back
    pub fn predict(&self, pixels: &[f32], count: usize) -> Result<Vec<Vec<f32>>> {
        let (network, metadata) = self.state.parts().ok_or_else(PipelineError::model_not_built)?;
        if pixels.len() != count * metadata.pixels_per_image() {
            return Err(PipelineError::Configuration(format!(
                "expected {} images of shape {:?}, got {} values",
                count,
                metadata.input_shape,
                pixels.len()
            )));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let device = <B::InnerBackend as Backend>::Device::default();
        let (h, w, c) = metadata.input_shape;
        let images = Tensor::<B::InnerBackend, 1>::from_floats(pixels, &device).reshape([count, c, h, w]);
        let probs = softmax(network.valid().forward(images), 1);

        let flat: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Serialization(format!("{:?}", e)))?;
        Ok(flat.chunks(metadata.num_classes).map(|row| row.to_vec()).collect())
    }

    /// Arg-max predictions and true labels over a whole split
    pub fn predict_dataset(&self, data: &PreparedDataset) -> Result<(Vec<usize>, Vec<usize>)> {
        let (network, metadata) = self.state.parts().ok_or_else(PipelineError::model_not_built)?;
        check_input(data, metadata)?;

        let batcher = ImageBatcher::<B::InnerBackend>::new(Default::default());
        let network = network.valid();
        let mut predictions = Vec::with_capacity(data.len());
        let mut labels = Vec::with_capacity(data.len());
        for batch in data.iter() {
            let batch = batch?;
            let tensors = batcher.batch(&batch);
            let predicted = network.forward(tensors.images).argmax(1).reshape([batch.len()]);
            let predicted: Vec<i64> = predicted
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| PipelineError::Serialization(format!("{:?}", e)))?;
            predictions.extend(predicted.into_iter().map(|p| p as usize));
            labels.extend_from_slice(&batch.labels);
        }
        Ok((predictions, labels))
    }

    /// Save record and sidecar; returns the record path
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let (network, metadata) = self.state.parts().ok_or_else(PipelineError::model_not_built)?;
        save_network(network, metadata, path)
    }

    /// Restore a saved model in the `Built` state
    pub fn load(path: &Path, device: B::Device) -> Result<Self> {
        let (network, metadata) = load_network::<B>(path, &device)?;
        Ok(Self {
            kind: metadata.kind,
            transfer: TransferLearningParams::default(),
            learning_rate: 1e-3,
            device,
            state: ModelState::Built { network, metadata },
        })
    }
}

fn resolve_loss(name: &str) -> Result<()> {
    let normalized = name.trim().to_lowercase();
    if CROSS_ENTROPY_LOSSES.contains(&normalized.as_str()) {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!("unknown loss '{}'", name)))
    }
}

fn resolve_metrics(metrics: &[String]) -> Result<()> {
    for metric in metrics {
        match metric.trim().to_lowercase().as_str() {
            "accuracy" | "acc" => {}
            _ => return Err(PipelineError::Configuration(format!("unknown metric '{}'", metric))),
        }
    }
    Ok(())
}

fn check_input(data: &PreparedDataset, metadata: &ModelMetadata) -> Result<()> {
    let (height, width, _) = metadata.input_shape;
    if data.image_size() != (height, width) {
        return Err(PipelineError::Configuration(format!(
            "images are {:?} but the model expects {}x{}",
            data.image_size(),
            height,
            width
        )));
    }
    Ok(())
}

/// Borrowed inputs of one `fit` call
struct FitRun<'a, B: AutodiffBackend> {
    train: &'a PreparedDataset,
    validation: Option<&'a PreparedDataset>,
    epochs: usize,
    learning_rate: f64,
    metadata: &'a ModelMetadata,
    device: &'a B::Device,
}

impl<B: AutodiffBackend> FitRun<'_, B> {
    fn execute<O: Optimizer<ClassifierNetwork<B>, B>>(
        &self,
        mut network: ClassifierNetwork<B>,
        mut optimizer: O,
        hooks: &mut [&mut dyn TrainingHook<B>],
    ) -> Result<(ClassifierNetwork<B>, TrainingHistory)> {
        let loss_fn = CrossEntropyLossConfig::new().init(self.device);
        let batcher = ImageBatcher::<B>::new(self.device.clone());
        let mut logger = TrainingLogger::new(self.epochs);
        let mut history = TrainingHistory::default();
        let mut control = TrainingControl::default();

        for epoch in 0..self.epochs {
            logger.start_epoch(epoch);

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;
            for (index, batch) in self.train.iter().enumerate() {
                let batch = batch?;
                let batch_size = batch.len();
                let tensors = batcher.batch(&batch);

                let output = network.forward(tensors.images);
                let loss = loss_fn.forward(output.clone(), tensors.targets.clone());
                let loss_value: f64 = loss.clone().into_scalar().elem();

                let batch_correct: i64 = output
                    .argmax(1)
                    .reshape([batch_size])
                    .equal(tensors.targets)
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();

                let grads = GradientsParams::from_grads(loss.backward(), &network);
                network = optimizer.step(self.learning_rate, network, grads);

                loss_sum += loss_value * batch_size as f64;
                correct += batch_correct as usize;
                seen += batch_size;
                debug!("batch {}: loss = {:.4}", index + 1, loss_value);
            }

            let (val_loss, val_accuracy) = match self.validation {
                Some(data) => {
                    let (loss, accuracy) = evaluate(&network.valid(), data)?;
                    (Some(loss), Some(accuracy))
                }
                None => (None, None),
            };

            let metrics = EpochMetrics {
                epoch: epoch + 1,
                loss: loss_sum / seen.max(1) as f64,
                accuracy: correct as f64 / seen.max(1) as f64,
                val_loss,
                val_accuracy,
            };
            logger.end_epoch(&metrics);

            let ctx = EpochContext {
                metrics: &metrics,
                network: &network,
                metadata: self.metadata,
            };
            for hook in hooks.iter_mut() {
                hook.on_epoch_end(&ctx, &mut control)?;
            }
            history.push(metrics);

            if control.stop {
                logger.log_early_stop();
                break;
            }
        }

        for hook in hooks.iter_mut() {
            network = hook.on_train_end(network, &control);
        }
        logger.log_complete(history.len());
        Ok((network, history))
    }
}

/// Mean loss and accuracy of `network` over one pass of `data`
fn evaluate<B: Backend>(network: &ClassifierNetwork<B>, data: &PreparedDataset) -> Result<(f64, f64)> {
    let device = B::Device::default();
    let loss_fn = CrossEntropyLossConfig::new().init(&device);
    let batcher = ImageBatcher::<B>::new(device);

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut seen = 0usize;
    for batch in data.iter() {
        let batch = batch?;
        let batch_size = batch.len();
        let tensors = batcher.batch(&batch);
        let output = network.forward(tensors.images);

        let loss: f64 = loss_fn
            .forward(output.clone(), tensors.targets.clone())
            .into_scalar()
            .elem();
        let batch_correct: i64 = output
            .argmax(1)
            .reshape([batch_size])
            .equal(tensors.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        loss_sum += loss * batch_size as f64;
        correct += batch_correct as usize;
        seen += batch_size;
    }

    Ok((loss_sum / seen.max(1) as f64, correct as f64 / seen.max(1) as f64))
}
