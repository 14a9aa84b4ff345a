//! Logging Module
//!
//! Structured logging with the `tracing` crate. Output goes to the console
//! and, when configured, to a plain-text log file under `logs/`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Layer};

use crate::training::history::EpochMetrics;
use crate::utils::error::{PipelineError, Result};
use crate::utils::format_duration;

/// Console and file sink settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub timestamps: bool,
    /// Print the module path of each event
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
    /// Plain-text copy of every event
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// Mirror log output into `<dir>/<name>.log`
    pub fn with_log_file(mut self, dir: impl AsRef<Path>, name: &str) -> Self {
        self.log_file = Some(dir.as_ref().join(format!("{}.log", name)));
        self
    }
}

/// Install the global subscriber.
///
/// Fails if one is already installed or the log file cannot be created.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let console = fmt::layer()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact();
    let console = if config.timestamps {
        console.boxed()
    } else {
        console.without_time().boxed()
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(LevelFilter::from_level(config.level))
        .try_init()
        .map_err(|e| PipelineError::Configuration(format!("logging already initialized: {}", e)))
}

/// Training progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (zero-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(&self, metrics: &EpochMetrics) {
        let elapsed = self.epoch_start.elapsed().as_secs_f64();
        let avg_epoch = self.training_start.elapsed().as_secs_f64() / (self.epoch + 1) as f64;
        let remaining = self.total_epochs.saturating_sub(self.epoch + 1);

        let validation = match (metrics.val_loss, metrics.val_accuracy) {
            (Some(loss), Some(acc)) => format!(" | val_loss: {:.4} | val_acc: {:.2}%", loss, acc * 100.0),
            _ => String::new(),
        };

        tracing::info!(
            "Epoch {}/{} in {} | loss: {:.4} | acc: {:.2}%{} | ETA: {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(elapsed),
            metrics.loss,
            metrics.accuracy * 100.0,
            validation,
            format_duration(remaining as f64 * avg_epoch)
        );
    }

    pub fn log_early_stop(&self) {
        tracing::warn!(
            "Training stopped early after epoch {}/{}",
            self.epoch + 1,
            self.total_epochs
        );
    }

    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "Training complete: {} epochs in {}",
            epochs_run,
            format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }
}
