//! Run identifier used to namespace checkpoints, reports, plots and
//! tracking runs.

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::utils::error::{PipelineError, Result};

/// Environment variable consulted once by the entry point
pub const RUN_ID_ENV: &str = "RUN_ID";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Configuration(
                "run identifier must not be empty".to_string(),
            ));
        }
        if trimmed.contains(['/', '\\']) {
            return Err(PipelineError::Configuration(format!(
                "run identifier '{}' must not contain path separators",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Timestamp-derived identifier, e.g. `20240131_142501`
    pub fn generate() -> Self {
        Self(Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Use `value` when given (typically `RUN_ID`), otherwise generate one
    pub fn from_env_value(value: Option<String>) -> Result<Self> {
        match value {
            Some(v) => Self::new(v),
            None => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_format() {
        let id = RunId::generate();
        assert_eq!(id.as_str().len(), 15);
        assert_eq!(&id.as_str()[8..9], "_");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            RunId::new("   "),
            Err(PipelineError::Configuration(_))
        ));
        assert!(RunId::new("a/b").is_err());
    }

    #[test]
    fn test_env_value_preferred() {
        let id = RunId::from_env_value(Some("exp-7".to_string())).unwrap();
        assert_eq!(id.to_string(), "exp-7");
        assert!(RunId::from_env_value(None).is_ok());
    }
}
