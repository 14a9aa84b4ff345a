//! Dataset download
//!
//! Fetches a Kaggle dataset archive with the `kaggle` CLI, unpacks it with
//! `unzip` and removes the archive.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::config::Config;
use crate::utils::error::{PipelineError, Result};

/// Environment variable naming the raw data directory
pub const RAW_DATA_PATH_ENV: &str = "RAW_DATA_PATH";

/// Pick the output directory: explicit flag, then environment, then config
pub fn resolve_output_dir(
    explicit: Option<PathBuf>,
    env_value: Option<String>,
    config: Option<&Config>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = env_value.filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let configured = match config {
        Some(config) => config.data()?.raw_data_dir,
        None => None,
    };
    configured.ok_or_else(|| {
        PipelineError::Configuration(format!(
            "no output directory: pass --output, set {} or data_config.raw_data_dir",
            RAW_DATA_PATH_ENV
        ))
    })
}

/// Download `kaggle_uri` into `output_dir` and unpack it there
pub fn download_dataset(kaggle_uri: &str, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    let dir = output_dir.to_string_lossy();

    info!("Downloading {} from Kaggle", kaggle_uri);
    run_tool("kaggle", &["datasets", "download", "-d", kaggle_uri, "-p", &dir])?;

    let archive = find_zip(output_dir)?;
    info!("Unzipping {:?}", archive);
    run_tool("unzip", &["-o", &archive.to_string_lossy(), "-d", &dir])?;

    info!("Removing {:?}", archive);
    fs::remove_file(&archive)?;

    info!("Data downloaded to {:?}", output_dir);
    Ok(())
}

/// First `*.zip` in `dir` by file name
pub fn find_zip(dir: &Path) -> Result<PathBuf> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    archives.sort();
    archives
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::not_found(dir.join("*.zip")))
}

fn run_tool(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| PipelineError::Download(format!("failed to start {}: {}", program, e)))?;
    if !status.success() {
        return Err(PipelineError::Download(format!(
            "{} {} exited with {}",
            program,
            args.join(" "),
            status
        )));
    }
    Ok(())
}
