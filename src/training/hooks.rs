//! Epoch hooks
//!
//! Hooks run after every epoch with read access to that epoch's metrics and
//! the current network. They may request a stop through [`TrainingControl`]
//! and may swap the final network when training ends.
//!
//! [`MetricTracking`] reports each epoch to the tracking run as soon as the
//! epoch ends, so completed epochs stay on record when a later one fails.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::model::{save_network, ClassifierNetwork, ModelMetadata, RECORD_EXTENSION};
use crate::tracking::ActiveRun;
use crate::training::history::EpochMetrics;
use crate::utils::error::Result;

/// Mutable loop state shared with hooks
#[derive(Debug, Clone, Default)]
pub struct TrainingControl {
    pub stop: bool,
}

/// What a hook sees at the end of an epoch
pub struct EpochContext<'a, B: Backend> {
    pub metrics: &'a EpochMetrics,
    pub network: &'a ClassifierNetwork<B>,
    pub metadata: &'a ModelMetadata,
}

pub trait TrainingHook<B: Backend> {
    fn on_epoch_end(&mut self, ctx: &EpochContext<'_, B>, control: &mut TrainingControl) -> Result<()>;

    /// Called once after the last epoch; may replace the trained network
    fn on_train_end(&mut self, network: ClassifierNetwork<B>, _control: &TrainingControl) -> ClassifierNetwork<B> {
        network
    }
}

/// Whether lower or higher values of a metric are better
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Min,
    Max,
}

/// Tracks the best value seen for one metric
#[derive(Debug, Clone)]
pub struct Monitor {
    pub name: String,
    pub mode: MonitorMode,
    pub best: Option<f64>,
}

impl Monitor {
    /// Accuracy-like names are maximised, everything else minimised
    pub fn new(name: &str) -> Self {
        let mode = if name.contains("acc") {
            MonitorMode::Max
        } else {
            MonitorMode::Min
        };
        Self {
            name: name.to_string(),
            mode,
            best: None,
        }
    }

    /// Record `value`; true when it beats the previous best
    pub fn update(&mut self, value: f64) -> bool {
        let improved = match (self.best, self.mode) {
            (None, _) => true,
            (Some(best), MonitorMode::Min) => value < best,
            (Some(best), MonitorMode::Max) => value > best,
        };
        if improved {
            self.best = Some(value);
        }
        improved
    }
}

/// Stops after `patience` epochs without improvement and restores the best
/// network seen.
pub struct EarlyStopping<B: Backend> {
    monitor: Monitor,
    patience: usize,
    wait: usize,
    best_network: Option<ClassifierNetwork<B>>,
    stopped_epoch: Option<usize>,
}

impl<B: Backend> EarlyStopping<B> {
    pub fn new(monitor: &str, patience: usize) -> Self {
        Self {
            monitor: Monitor::new(monitor),
            patience,
            wait: 0,
            best_network: None,
            stopped_epoch: None,
        }
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn best(&self) -> Option<f64> {
        self.monitor.best
    }
}

impl<B: Backend> TrainingHook<B> for EarlyStopping<B> {
    fn on_epoch_end(&mut self, ctx: &EpochContext<'_, B>, control: &mut TrainingControl) -> Result<()> {
        let Some(value) = ctx.metrics.get(&self.monitor.name) else {
            warn!("Early stopping metric '{}' not available; skipping", self.monitor.name);
            return Ok(());
        };

        if self.monitor.update(value) {
            self.wait = 0;
            self.best_network = Some(ctx.network.clone());
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                self.stopped_epoch = Some(ctx.metrics.epoch);
                control.stop = true;
                warn!(
                    "Early stopping at epoch {}: {} did not improve for {} epochs",
                    ctx.metrics.epoch, self.monitor.name, self.wait
                );
            }
        }
        Ok(())
    }

    fn on_train_end(&mut self, network: ClassifierNetwork<B>, _control: &TrainingControl) -> ClassifierNetwork<B> {
        match (self.stopped_epoch, self.best_network.take()) {
            (Some(_), Some(best)) => {
                info!("Restoring network from best {} = {:?}", self.monitor.name, self.monitor.best);
                best
            }
            _ => network,
        }
    }
}

/// Saves the full model whenever validation loss improves
pub struct BestCheckpoint {
    monitor: Monitor,
    path: PathBuf,
    saved_path: Option<PathBuf>,
}

impl BestCheckpoint {
    /// `path` is a model path as accepted by [`save_network`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            monitor: Monitor::new("val_loss"),
            path: path.into(),
            saved_path: None,
        }
    }

    pub fn for_run(model_dir: &Path, run_id: &str) -> Self {
        Self::new(model_dir.join(format!("{}.{}", run_id, RECORD_EXTENSION)))
    }

    /// Location of the last saved checkpoint, if any
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_path.as_deref()
    }
}

impl<B: Backend> TrainingHook<B> for BestCheckpoint {
    fn on_epoch_end(&mut self, ctx: &EpochContext<'_, B>, _control: &mut TrainingControl) -> Result<()> {
        let Some(value) = ctx.metrics.get(&self.monitor.name) else {
            warn!("Checkpoint metric '{}' not available; not saving", self.monitor.name);
            return Ok(());
        };

        let previous = self.monitor.best;
        if self.monitor.update(value) {
            let saved = save_network(ctx.network, ctx.metadata, &self.path)?;
            info!(
                "Epoch {}: {} improved from {:?} to {:.4}, saved {:?}",
                ctx.metrics.epoch, self.monitor.name, previous, value, saved
            );
            self.saved_path = Some(saved);
        }
        Ok(())
    }
}

/// Logs the metrics of every finished epoch to a tracking run, stepped by
/// epoch number
pub struct MetricTracking<'r, 't> {
    run: &'r mut ActiveRun<'t>,
}

impl<'r, 't> MetricTracking<'r, 't> {
    pub fn new(run: &'r mut ActiveRun<'t>) -> Self {
        Self { run }
    }
}

impl<B: Backend> TrainingHook<B> for MetricTracking<'_, '_> {
    fn on_epoch_end(&mut self, ctx: &EpochContext<'_, B>, _control: &mut TrainingControl) -> Result<()> {
        for (key, value) in ctx.metrics.entries() {
            self.run.log_metric(key, value, ctx.metrics.epoch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelKind, ModelMetadata};
    use crate::tracking::FileTracker;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(ModelKind::SimpleCnn, (24, 24, 3), 2)
    }

    fn network(meta: &ModelMetadata) -> ClassifierNetwork<TestBackend> {
        ClassifierNetwork::build(meta, &Default::default(), &Default::default()).unwrap()
    }

    fn outputs(net: &ClassifierNetwork<TestBackend>) -> Vec<f32> {
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 24, 24], &Default::default());
        net.forward(input).into_data().to_vec().unwrap()
    }

    fn same_outputs(a: &[f32], b: &[f32]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    /// Feed `(val_loss, network)` pairs epoch by epoch
    fn run_epochs(
        hook: &mut EarlyStopping<TestBackend>,
        meta: &ModelMetadata,
        epochs: &[(f64, &ClassifierNetwork<TestBackend>)],
    ) -> TrainingControl {
        let mut control = TrainingControl::default();
        for (i, (loss, net)) in epochs.iter().enumerate() {
            let m = epoch(i + 1, *loss);
            let ctx = EpochContext { metrics: &m, network: *net, metadata: meta };
            hook.on_epoch_end(&ctx, &mut control).unwrap();
            if control.stop {
                break;
            }
        }
        control
    }

    fn epoch(epoch: usize, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            loss: 1.0,
            accuracy: 0.5,
            val_loss: Some(val_loss),
            val_accuracy: Some(0.5),
        }
    }

    #[test]
    fn test_monitor_modes() {
        let mut loss = Monitor::new("val_loss");
        assert!(loss.update(1.0));
        assert!(!loss.update(1.0));
        assert!(loss.update(0.5));

        let mut acc = Monitor::new("val_accuracy");
        assert_eq!(acc.mode, MonitorMode::Max);
        assert!(acc.update(0.2));
        assert!(!acc.update(0.1));
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let meta = metadata();
        let net = network(&meta);
        let mut hook = EarlyStopping::<TestBackend>::new("val_loss", 2);
        let mut control = TrainingControl::default();

        for (i, loss) in [0.9, 0.8, 0.85, 0.81].iter().enumerate() {
            let m = epoch(i + 1, *loss);
            let ctx = EpochContext { metrics: &m, network: &net, metadata: &meta };
            hook.on_epoch_end(&ctx, &mut control).unwrap();
        }
        assert!(control.stop);
        assert_eq!(hook.stopped_epoch(), Some(4));
        assert_eq!(hook.best(), Some(0.8));
    }

    #[test]
    fn test_early_stopping_restores_best_network_after_stop() {
        let meta = metadata();
        let best = network(&meta);
        let later = network(&meta);
        let mut hook = EarlyStopping::<TestBackend>::new("val_loss", 2);

        let control = run_epochs(&mut hook, &meta, &[(0.5, &best), (0.6, &later), (0.7, &later)]);
        assert!(control.stop);
        assert_eq!(hook.stopped_epoch(), Some(3));

        let restored = hook.on_train_end(later.clone(), &control);
        assert!(same_outputs(&outputs(&restored), &outputs(&best)));
        assert!(!same_outputs(&outputs(&restored), &outputs(&later)));
    }

    #[test]
    fn test_early_stopping_keeps_last_network_without_stop() {
        let meta = metadata();
        let best = network(&meta);
        let last = network(&meta);
        let mut hook = EarlyStopping::<TestBackend>::new("val_loss", 5);

        let control = run_epochs(&mut hook, &meta, &[(0.5, &best), (0.6, &last)]);
        assert!(!control.stop);
        assert_eq!(hook.stopped_epoch(), None);

        let kept = hook.on_train_end(last.clone(), &control);
        assert!(same_outputs(&outputs(&kept), &outputs(&last)));
    }

    #[test]
    fn test_metric_tracking_logs_each_epoch_immediately() {
        let dir = TempDir::new().unwrap();
        let meta = metadata();
        let net = network(&meta);
        let mut tracker = FileTracker::new(dir.path());
        {
            let mut run = ActiveRun::start(&mut tracker, "run1").unwrap();
            let mut hook = MetricTracking::new(&mut run);
            let mut control = TrainingControl::default();
            let m = epoch(1, 0.4);
            TrainingHook::<TestBackend>::on_epoch_end(
                &mut hook,
                &EpochContext { metrics: &m, network: &net, metadata: &meta },
                &mut control,
            )
            .unwrap();
        }

        let metrics = tracker.read_metrics("run1").unwrap();
        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().all(|m| m.step == 1));
        assert!(metrics.iter().any(|m| m.key == "val_loss" && m.value == 0.4));
    }

    #[test]
    fn test_early_stopping_missing_metric_is_ignored() {
        let meta = metadata();
        let net = network(&meta);
        let mut hook = EarlyStopping::<TestBackend>::new("val_f1", 0);
        let mut control = TrainingControl::default();
        let m = epoch(1, 0.5);
        let ctx = EpochContext { metrics: &m, network: &net, metadata: &meta };
        hook.on_epoch_end(&ctx, &mut control).unwrap();
        assert!(!control.stop);
    }

    #[test]
    fn test_best_checkpoint_saves_only_on_improvement() {
        let dir = TempDir::new().unwrap();
        let meta = metadata();
        let net = network(&meta);
        let mut hook = BestCheckpoint::for_run(dir.path(), "run1");
        let mut control = TrainingControl::default();
        assert!(hook.saved_path().is_none());

        let first = epoch(1, 0.7);
        TrainingHook::<TestBackend>::on_epoch_end(
            &mut hook,
            &EpochContext { metrics: &first, network: &net, metadata: &meta },
            &mut control,
        )
        .unwrap();
        let saved = hook.saved_path().unwrap().to_path_buf();
        assert!(saved.exists());
        let modified = std::fs::metadata(&saved).unwrap().modified().unwrap();

        let worse = epoch(2, 0.9);
        TrainingHook::<TestBackend>::on_epoch_end(
            &mut hook,
            &EpochContext { metrics: &worse, network: &net, metadata: &meta },
            &mut control,
        )
        .unwrap();
        assert_eq!(std::fs::metadata(&saved).unwrap().modified().unwrap(), modified);
        assert!(!control.stop);
    }
}
