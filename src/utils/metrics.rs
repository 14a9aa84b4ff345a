//! Classification Metrics
//!
//! Confusion matrix and a per-class precision/recall/F1 report with
//! accuracy, macro and weighted averages.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Confusion matrix (row = actual, column = predicted), flat row-major storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Build from paired predictions and ground-truth labels.
    /// Indices outside `0..num_classes` are ignored.
    pub fn from_predictions(predictions: &[usize], labels: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &label) in predictions.iter().zip(labels.iter()) {
            cm.add(label, pred);
        }
        cm
    }

    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.matrix[actual * self.num_classes + predicted]
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }
}

/// One row of the classification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize, name: &str) -> Self {
        let tp = cm.get(class_idx, class_idx);
        let predicted: usize = (0..cm.num_classes).map(|i| cm.get(i, class_idx)).sum();
        let support: usize = (0..cm.num_classes).map(|j| cm.get(class_idx, j)).sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            name: name.to_string(),
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-class report plus aggregate rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn from_predictions(predictions: &[usize], labels: &[usize], class_names: &[String]) -> Self {
        let num_classes = class_names.len();
        let cm = ConfusionMatrix::from_predictions(predictions, labels, num_classes);

        let per_class: Vec<ClassMetrics> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| ClassMetrics::from_confusion_matrix(&cm, idx, name))
            .collect();

        let total = cm.total();
        let n = num_classes.max(1) as f64;

        let macro_avg = ClassMetrics {
            name: "macro avg".to_string(),
            precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            name: "weighted avg".to_string(),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            accuracy: ratio(cm.correct(), total),
            per_class,
            macro_avg,
            weighted_avg,
            confusion_matrix: cm,
        }
    }

    /// Write the report as CSV: one row per class, then accuracy, macro avg, weighted avg
    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "class,precision,recall,f1-score,support")?;

        for row in &self.per_class {
            write_row(&mut file, row)?;
        }
        let total = self.confusion_matrix.total();
        writeln!(
            file,
            "accuracy,{:.4},{:.4},{:.4},{}",
            self.accuracy, self.accuracy, self.accuracy, total
        )?;
        write_row(&mut file, &self.macro_avg)?;
        write_row(&mut file, &self.weighted_avg)?;

        Ok(())
    }
}

fn write_row(out: &mut impl Write, row: &ClassMetrics) -> std::io::Result<()> {
    writeln!(
        out,
        "{},{:.4},{:.4},{:.4},{}",
        csv_field(&row.name),
        row.precision,
        row.recall,
        row.f1,
        row.support
    )
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
