//! Data pipeline

use tracing::info;

use crate::artifact::DataIngestionArtifact;
use crate::config::Config;
use crate::dataset::{DataIngestor, DataPreprocessor, DataValidator};
use crate::utils::error::Result;

pub struct DataPipeline {
    validator: DataValidator,
    ingestor: DataIngestor,
    preprocessor: DataPreprocessor,
}

impl DataPipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            validator: DataValidator::from_config(config)?,
            ingestor: DataIngestor::from_config(config)?,
            preprocessor: DataPreprocessor::from_config(config)?,
        })
    }

    /// Validation errors abort before any image is decoded
    pub fn run(&self) -> Result<DataIngestionArtifact> {
        info!("Starting data pipeline");

        self.validator.validate()?;

        let (train, test, class_names, num_classes) = self.ingestor.load()?;
        info!("Train batches: {}", train.num_batches());
        info!("Test batches: {}", test.num_batches());
        info!("Classes: {:?}", class_names);
        info!("Num classes: {}", num_classes);

        let (train, test) = self.preprocessor.process(train, test);
        let artifact = DataIngestionArtifact::new(train, test, class_names, num_classes)?;

        info!("Data pipeline completed successfully");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_util::write_split;
    use crate::utils::error::PipelineError;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(root: &Path, augment: bool) -> Config {
        Config::from_yaml_str(&format!(
            r#"
data_config:
  TRAIN_DIR: {0}/train
  TEST_DIR: {0}/test
  IMG_SIZE: [16, 16]
  BATCH_SIZE: 4
  SEED: 7
augmentation:
  enabled: {1}
"#,
            root.display(),
            augment
        ))
        .unwrap()
    }

    #[test]
    fn test_pipeline_produces_artifact() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 5), ("dog", 5)]);
        write_split(dir.path(), "test", &[("cat", 2), ("dog", 2)]);

        let artifact = DataPipeline::from_config(&config(dir.path(), true))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(artifact.class_names, vec!["cat", "dog"]);
        assert_eq!(artifact.num_classes, 2);
        assert_eq!(artifact.train.len(), 10);
        assert_eq!(artifact.test.len(), 4);
        assert!(artifact.train.transform().is_augmenting());
        assert!(!artifact.test.transform().is_augmenting());
    }

    #[test]
    fn test_validation_failure_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 3)]);
        write_split(dir.path(), "test", &[("cat", 1), ("dog", 1)]);

        let err = DataPipeline::from_config(&config(dir.path(), false))
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inconsistency(_)));
    }

    #[test]
    fn test_missing_data_config() {
        let config = Config::from_yaml_str("model_config: {}").unwrap();
        assert!(matches!(
            DataPipeline::from_config(&config),
            Err(PipelineError::Configuration(_))
        ));
    }
}
