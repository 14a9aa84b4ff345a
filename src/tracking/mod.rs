//! Experiment Tracking Module
//!
//! MLflow-style run tracking on the local filesystem:
//!
//! ```text
//! <root>/<run_name>/meta.json      name, status, start/end time
//! <root>/<run_name>/params.json    hyperparameters
//! <root>/<run_name>/metrics.jsonl  one metric point per line
//! <root>/<run_name>/artifacts/     uploaded model files
//! ```
//!
//! [`ActiveRun`] ties a run's lifetime to a scope: it ends the run as
//! `FINISHED` on [`ActiveRun::finish`] and as `FAILED` when dropped early.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::sidecar_path;
use crate::utils::error::{PipelineError, Result};

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// A single metric point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub step: usize,
    pub timestamp: i64,
}

/// Contents of `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_name: String,
    pub status: RunStatus,
    pub start_time: String,
    pub end_time: Option<String>,
}

pub trait ExperimentTracker {
    fn start_run(&mut self, run_name: &str) -> Result<()>;
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()>;
    fn log_metric(&mut self, key: &str, value: f64, step: usize) -> Result<()>;
    /// Upload a saved model and its sidecar
    fn log_model(&mut self, path: &Path) -> Result<()>;
    fn end_run(&mut self, status: RunStatus) -> Result<()>;
}

/// Tracker writing runs under a root directory
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    current: Option<(PathBuf, RunMeta)>,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_name: &str) -> PathBuf {
        self.root.join(run_name)
    }

    fn active_dir(&self) -> Result<&Path> {
        self.current
            .as_ref()
            .map(|(dir, _)| dir.as_path())
            .ok_or_else(|| PipelineError::Tracking("no active run".to_string()))
    }

    fn write_meta(dir: &Path, meta: &RunMeta) -> Result<()> {
        fs::write(dir.join("meta.json"), serde_json::to_string_pretty(meta)?)?;
        Ok(())
    }

    /// Read back the metadata of a run
    pub fn read_meta(&self, run_name: &str) -> Result<RunMeta> {
        let path = self.run_dir(run_name).join("meta.json");
        if !path.exists() {
            return Err(PipelineError::not_found(path));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Read back every metric point of a run in logging order
    pub fn read_metrics(&self, run_name: &str) -> Result<Vec<Metric>> {
        let path = self.run_dir(run_name).join("metrics.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(PipelineError::from))
            .collect()
    }
}

impl ExperimentTracker for FileTracker {
    fn start_run(&mut self, run_name: &str) -> Result<()> {
        if let Some((_, meta)) = &self.current {
            return Err(PipelineError::Tracking(format!(
                "run '{}' is still active",
                meta.run_name
            )));
        }

        let dir = self.run_dir(run_name);
        fs::create_dir_all(dir.join("artifacts"))?;
        let meta = RunMeta {
            run_name: run_name.to_string(),
            status: RunStatus::Running,
            start_time: chrono::Local::now().to_rfc3339(),
            end_time: None,
        };
        Self::write_meta(&dir, &meta)?;
        info!("Tracking run '{}' in {:?}", run_name, dir);
        self.current = Some((dir, meta));
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let path = self.active_dir()?.join("params.json");
        let mut merged: BTreeMap<String, String> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        fs::write(path, serde_json::to_string_pretty(&merged)?)?;
        Ok(())
    }

    fn log_metric(&mut self, key: &str, value: f64, step: usize) -> Result<()> {
        let path = self.active_dir()?.join("metrics.jsonl");
        let metric = Metric {
            key: key.to_string(),
            value,
            step,
            timestamp: chrono::Local::now().timestamp_millis(),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(&metric)?)?;
        debug!("metric {} = {:.4} @ {}", key, value, step);
        Ok(())
    }

    fn log_model(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::not_found(path));
        }
        let artifacts = self.active_dir()?.join("artifacts");
        fs::create_dir_all(&artifacts)?;

        let sidecar = sidecar_path(path);
        for file in [path.to_path_buf(), sidecar] {
            if let Some(name) = file.file_name().filter(|_| file.exists()) {
                fs::copy(&file, artifacts.join(name))?;
            }
        }
        info!("Logged model {:?}", path);
        Ok(())
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let (dir, mut meta) = self
            .current
            .take()
            .ok_or_else(|| PipelineError::Tracking("no active run".to_string()))?;
        meta.status = status;
        meta.end_time = Some(chrono::Local::now().to_rfc3339());
        Self::write_meta(&dir, &meta)?;
        info!("Run '{}' ended with status {:?}", meta.run_name, status);
        Ok(())
    }
}

/// A started run that is always ended exactly once
pub struct ActiveRun<'a> {
    tracker: &'a mut dyn ExperimentTracker,
    finished: bool,
}

impl<'a> ActiveRun<'a> {
    pub fn start(tracker: &'a mut dyn ExperimentTracker, run_name: &str) -> Result<Self> {
        tracker.start_run(run_name)?;
        Ok(Self {
            tracker,
            finished: false,
        })
    }

    pub fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        self.tracker.log_params(params)
    }

    pub fn log_metric(&mut self, key: &str, value: f64, step: usize) -> Result<()> {
        self.tracker.log_metric(key, value, step)
    }

    pub fn log_model(&mut self, path: &Path) -> Result<()> {
        self.tracker.log_model(path)
    }

    /// End the run successfully
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.tracker.end_run(RunStatus::Finished)
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.tracker.end_run(RunStatus::Failed) {
                warn!("Failed to close tracking run: {}", e);
            }
        }
    }
}
