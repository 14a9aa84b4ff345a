//! Configuration Loader
//!
//! Reads the YAML parameter file into an untyped mapping. Components pull
//! typed sections out of it by key; a missing required key is a
//! configuration error naming that key.
//!
//! The file is loaded once by the entry point and shared by reference, so
//! every component of a run sees the same snapshot.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::utils::error::{PipelineError, Result};

/// Default location of the parameter file
pub const MODEL_PARAMS_FILE: &str = "configs/model_parameters.yaml";

/// Parsed configuration mapping
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Load and parse a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::not_found(path));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        Ok(Self { root })
    }

    /// Look up a dotted key path such as `callbacks.early_stopping`
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, part| node.get(part))
            .filter(|v| !v.is_null())
    }

    /// Deserialize a required section
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| PipelineError::Configuration(format!("missing required key '{}'", key)))?;
        serde_yaml::from_value(value.clone())
            .map_err(|e| PipelineError::Configuration(format!("invalid value for '{}': {}", key, e)))
    }

    /// Deserialize an optional section, `None` when absent
    pub fn optional_section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(_) => self.section(key).map(Some),
            None => Ok(None),
        }
    }

    pub fn data(&self) -> Result<DataConfig> {
        self.section("data_config")
    }

    pub fn model(&self) -> Result<ModelParams> {
        self.section("model_config")
    }

    pub fn augmentation(&self) -> Result<AugmentationParams> {
        Ok(self.optional_section("augmentation")?.unwrap_or_default())
    }

    pub fn early_stopping(&self) -> Result<Option<EarlyStoppingParams>> {
        self.optional_section("callbacks.early_stopping")
    }

    /// Model variant discriminator; defaults to the simple CNN
    pub fn model_type(&self) -> Result<String> {
        Ok(self
            .optional_section::<String>("model_type")?
            .unwrap_or_else(|| "simple_cnn".to_string()))
    }

    pub fn transfer_learning(&self) -> Result<TransferLearningParams> {
        Ok(self.optional_section("transfer_learning")?.unwrap_or_default())
    }

    pub fn tracking(&self) -> Result<TrackingParams> {
        Ok(self.optional_section("tracking")?.unwrap_or_default())
    }
}

/// `data_config` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(rename = "TRAIN_DIR")]
    pub train_dir: PathBuf,
    #[serde(rename = "TEST_DIR")]
    pub test_dir: PathBuf,
    /// `[height, width]`
    #[serde(rename = "IMG_SIZE")]
    pub img_size: (usize, usize),
    #[serde(rename = "BATCH_SIZE")]
    pub batch_size: usize,
    #[serde(rename = "SEED")]
    pub seed: u64,
    #[serde(default)]
    pub raw_data_dir: Option<PathBuf>,
}

/// `model_config` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub optimizer: String,
    pub loss: String,
    pub metrics: Vec<String>,
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_learning_rate() -> f64 {
    1e-3
}

/// `augmentation` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationParams {
    #[serde(default)]
    pub enabled: bool,
    /// Maximum rotation as a fraction of a full turn
    #[serde(default = "default_factor")]
    pub rotation: f32,
    /// Maximum zoom as a fraction of the image size
    #[serde(default = "default_factor")]
    pub zoom: f32,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        Self {
            enabled: false,
            rotation: default_factor(),
            zoom: default_factor(),
        }
    }
}

fn default_factor() -> f32 {
    0.1
}

/// `callbacks.early_stopping` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingParams {
    pub monitor: String,
    pub patience: usize,
}

/// `transfer_learning` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLearningParams {
    #[serde(default = "default_true")]
    pub freeze_base_model: bool,
    #[serde(default)]
    pub unfreeze_last_n_layers: usize,
    /// Pretrained backbone record
    #[serde(default)]
    pub weights_path: Option<PathBuf>,
}

impl Default for TransferLearningParams {
    fn default() -> Self {
        Self {
            freeze_base_model: true,
            unfreeze_last_n_layers: 0,
            weights_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `tracking` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingParams {
    #[serde(default = "default_tracking_dir")]
    pub dir: PathBuf,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            dir: default_tracking_dir(),
        }
    }
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from("mlruns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
data_config:
  TRAIN_DIR: data/train
  TEST_DIR: data/test
  IMG_SIZE: [64, 64]
  BATCH_SIZE: 4
  SEED: 42
model_config:
  optimizer: adam
  loss: sparse_categorical_crossentropy
  metrics: [accuracy]
  epochs: 3
augmentation:
  enabled: true
  rotation: 0.2
callbacks:
  early_stopping:
    monitor: val_loss
    patience: 2
model_type: vgg16
"#;

    #[test]
    fn test_typed_sections() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();

        let data = config.data().unwrap();
        assert_eq!(data.img_size, (64, 64));
        assert_eq!(data.batch_size, 4);
        assert!(data.raw_data_dir.is_none());

        let model = config.model().unwrap();
        assert_eq!(model.epochs, 3);
        assert_eq!(model.learning_rate, 1e-3);

        let aug = config.augmentation().unwrap();
        assert!(aug.enabled);
        assert_eq!(aug.rotation, 0.2);
        assert_eq!(aug.zoom, 0.1);

        let es = config.early_stopping().unwrap().unwrap();
        assert_eq!(es.monitor, "val_loss");
        assert_eq!(config.model_type().unwrap(), "vgg16");

        let tl = config.transfer_learning().unwrap();
        assert!(tl.freeze_base_model);
        assert_eq!(tl.unfreeze_last_n_layers, 0);
    }

    #[test]
    fn test_missing_section_names_key() {
        let config = Config::from_yaml_str("model_type: simple\n").unwrap();
        let err = config.data().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("data_config"));
    }

    #[test]
    fn test_missing_field_is_configuration_error() {
        let config = Config::from_yaml_str("data_config:\n  TRAIN_DIR: a\n").unwrap();
        let err = config.data().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_optional_sections_default() {
        let config = Config::from_yaml_str("model_type: ~\n").unwrap();
        assert!(config.early_stopping().unwrap().is_none());
        assert_eq!(config.model_type().unwrap(), "simple_cnn");
        assert!(!config.augmentation().unwrap().enabled);
        assert_eq!(config.tracking().unwrap().dir, PathBuf::from("mlruns"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.model().unwrap().optimizer, "adam");
    }
}
