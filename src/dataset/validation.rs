//! Structural validation of the train/test directory trees
//!
//! Both roots must exist, contain the same set of class folders, and every
//! training class folder must hold at least one image file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::dataset::{is_image_file, list_class_dirs};
use crate::utils::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct DataValidator {
    train_dir: PathBuf,
    test_dir: PathBuf,
}

impl DataValidator {
    pub fn new(train_dir: impl Into<PathBuf>, test_dir: impl Into<PathBuf>) -> Self {
        Self {
            train_dir: train_dir.into(),
            test_dir: test_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let data = config.data()?;
        Ok(Self::new(data.train_dir, data.test_dir))
    }

    /// Succeeds silently; read-only scan of both roots
    pub fn validate(&self) -> Result<()> {
        info!("Validating dataset structure");

        for root in [&self.train_dir, &self.test_dir] {
            if !root.is_dir() {
                return Err(PipelineError::not_found(root));
            }
        }

        let train_classes: BTreeSet<String> = list_class_dirs(&self.train_dir)?.into_iter().collect();
        let test_classes: BTreeSet<String> = list_class_dirs(&self.test_dir)?.into_iter().collect();

        if train_classes != test_classes {
            return Err(PipelineError::Inconsistency(format!(
                "Train/Test class mismatch: {:?} vs {:?}",
                train_classes, test_classes
            )));
        }

        for class in &train_classes {
            if !has_images(&self.train_dir.join(class))? {
                return Err(PipelineError::Inconsistency(format!(
                    "Empty class folder: {}",
                    class
                )));
            }
        }

        info!("Dataset structure valid: {} classes", train_classes.len());
        Ok(())
    }
}

/// Same filter ingestion applies, so a folder of stray files counts as empty
fn has_images(dir: &Path) -> Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_util::write_split;
    use tempfile::TempDir;

    fn validator(root: &Path) -> DataValidator {
        DataValidator::new(root.join("train"), root.join("test"))
    }

    #[test]
    fn test_matching_trees_pass() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 2), ("dog", 1)]);
        write_split(dir.path(), "test", &[("cat", 1), ("dog", 1)]);
        validator(dir.path()).validate().unwrap();
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 1)]);
        let err = validator(dir.path()).validate().unwrap_err();
        match err {
            PipelineError::NotFound(path) => assert!(path.ends_with("test")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_class_mismatch_names_both_sets() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 2)]);
        write_split(dir.path(), "test", &[("cat", 1), ("dog", 1)]);

        let err = validator(dir.path()).validate().unwrap_err();
        assert!(matches!(err, PipelineError::Inconsistency(_)));
        let msg = err.to_string();
        assert!(msg.contains(r#"{"cat"} vs {"cat", "dog"}"#), "{msg}");
    }

    #[test]
    fn test_empty_class_folder_named() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 2)]);
        std::fs::create_dir_all(dir.path().join("train").join("dog")).unwrap();
        write_split(dir.path(), "test", &[("cat", 1), ("dog", 1)]);

        let err = validator(dir.path()).validate().unwrap_err();
        assert!(matches!(err, PipelineError::Inconsistency(_)));
        assert!(err.to_string().contains("Empty class folder: dog"));
    }

    #[test]
    fn test_class_with_only_stray_files_is_empty() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 2)]);
        let dog = dir.path().join("train").join("dog");
        std::fs::create_dir_all(dog.join("nested.png")).unwrap();
        std::fs::write(dog.join("notes.txt"), "x").unwrap();
        write_split(dir.path(), "test", &[("cat", 1), ("dog", 1)]);

        let err = validator(dir.path()).validate().unwrap_err();
        assert!(matches!(err, PipelineError::Inconsistency(_)));
        assert!(err.to_string().contains("Empty class folder: dog"));
    }

    #[test]
    fn test_empty_test_class_is_allowed() {
        let dir = TempDir::new().unwrap();
        write_split(dir.path(), "train", &[("cat", 1)]);
        std::fs::create_dir_all(dir.path().join("test").join("cat")).unwrap();
        validator(dir.path()).validate().unwrap();
    }
}
