//! Error Handling Module
//!
//! Error taxonomy for the pipeline. The first four variants are the
//! user-facing failure kinds; the rest wrap infrastructure failures.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required directory or file does not exist
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Structural mismatch in the dataset tree
    #[error("Inconsistent dataset: {0}")]
    Inconsistency(String),

    /// Missing configuration key or unset run identifier
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation invoked before a required prior step
    #[error("Invalid state: {0}")]
    State(String),

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    Image(PathBuf, String),

    /// Model record could not be written or read
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Experiment tracking failure
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// External download tooling failed
    #[error("Download error: {0}")]
    Download(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        PipelineError::NotFound(path.into())
    }

    pub fn model_not_built() -> Self {
        PipelineError::State("model must be built first".to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Image(PathBuf::new(), err.to_string())
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Inconsistency("Empty class folder: dog".to_string());
        assert_eq!(format!("{}", err), "Inconsistent dataset: Empty class folder: dog");
    }

    #[test]
    fn test_not_found_includes_path() {
        let err = PipelineError::not_found("/data/train");
        assert!(format!("{}", err).contains("/data/train"));
    }

    #[test]
    fn test_model_not_built_message() {
        let err = PipelineError::model_not_built();
        assert!(matches!(err, PipelineError::State(_)));
        assert!(err.to_string().contains("model must be built first"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [1, 2").unwrap_err();
        let err: PipelineError = yaml_err.into();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
