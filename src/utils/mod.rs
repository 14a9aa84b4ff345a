//! Utilities module for logging, metrics, charts and error types

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{PipelineError, Result};
pub use logging::{init_logging, LogConfig, TrainingLogger};
pub use metrics::{ClassificationReport, ConfusionMatrix};

/// `42.0s`, `3m 5s` or `2h 10m`
pub fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    match whole {
        0..=59 => format!("{:.1}s", seconds.max(0.0)),
        60..=3599 => format!("{}m {}s", whole / 60, whole % 60),
        _ => format!("{}h {}m", whole / 3600, (whole % 3600) / 60),
    }
}
