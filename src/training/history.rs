//! Per-epoch training record

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Metrics of one completed epoch (1-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

impl EpochMetrics {
    /// Look up a metric by its tracked name
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "loss" => Some(self.loss),
            "accuracy" => Some(self.accuracy),
            "val_loss" => self.val_loss,
            "val_accuracy" => self.val_accuracy,
            _ => None,
        }
    }

    /// `(name, value)` for every recorded metric
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![("accuracy", self.accuracy), ("loss", self.loss)];
        if let Some(v) = self.val_accuracy {
            out.push(("val_accuracy", v));
        }
        if let Some(v) = self.val_loss {
            out.push(("val_loss", v));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// `(epoch, value)` points of one metric, skipping epochs without it
    pub fn series(&self, name: &str) -> Vec<(f64, f64)> {
        self.epochs
            .iter()
            .filter_map(|m| m.get(name).map(|v| (m.epoch as f64, v)))
            .collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
