//! Image classifier CLI
//!
//! Entry point for validating datasets, running the data and training
//! pipelines, predicting single images and downloading raw data.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use image_classifier::backend::{backend_name, default_device, TrainingBackend};
use image_classifier::config::MODEL_PARAMS_FILE;
use image_classifier::download::{download_dataset, resolve_output_dir, RAW_DATA_PATH_ENV};
use image_classifier::run_id::RUN_ID_ENV;
use image_classifier::utils::logging::{init_logging, LogConfig};
use image_classifier::{
    Config, DataPipeline, DataValidator, Model, Predictor, RunId, TrainingPipeline, LOG_DIR, VERSION,
};

/// Image classification training pipeline
#[derive(Parser, Debug)]
#[command(name = "image_classifier")]
#[command(version = VERSION)]
#[command(about = "Train and evaluate image classifiers with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Path to the parameter file
    #[arg(short, long, default_value = MODEL_PARAMS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the data pipeline, then train, evaluate and plot
    Run,

    /// Check the train/test directory structure only
    Validate,

    /// Run the data pipeline and report what was loaded
    Data,

    /// Predict the class of a single image
    Predict {
        /// Saved model, e.g. artifacts/model/<run_id>
        #[arg(short, long)]
        model: PathBuf,

        /// Image to classify
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Download and unpack a Kaggle dataset
    Download {
        /// Kaggle dataset identifier (owner/name)
        #[arg(short, long)]
        dataset: String,

        /// Output directory (falls back to RAW_DATA_PATH, then data_config.raw_data_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let run_id = RunId::from_env_value(std::env::var(RUN_ID_ENV).ok())?;

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    }
    .with_log_file(LOG_DIR, run_id.as_str());
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }

    print_banner();
    info!("Run {} on {}", run_id, backend_name());

    match cli.command {
        Commands::Run => cmd_run(&load_config(&cli.config)?, &run_id),
        Commands::Validate => cmd_validate(&load_config(&cli.config)?),
        Commands::Data => cmd_data(&load_config(&cli.config)?),
        Commands::Predict { model, image } => cmd_predict(&model, &image),
        Commands::Download { dataset, output } => {
            let config = cli.config.exists().then(|| load_config(&cli.config)).transpose()?;
            cmd_download(config.as_ref(), &dataset, output)
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}

fn print_banner() {
    println!(
        "{}",
        format!("Image Classifier v{} | backend: {}", VERSION, backend_name())
            .green()
            .bold()
    );
}

fn cmd_validate(config: &Config) -> Result<()> {
    DataValidator::from_config(config)?.validate()?;
    println!("{}", "Dataset structure is valid".green());
    Ok(())
}

fn cmd_data(config: &Config) -> Result<()> {
    let data = DataPipeline::from_config(config)?.run()?;

    println!("{}", "Data Pipeline:".cyan().bold());
    println!("  Classes:       {:?}", data.class_names);
    println!("  Train batches: {} ({} images)", data.train.num_batches(), data.train.len());
    println!("  Test batches:  {} ({} images)", data.test.num_batches(), data.test.len());
    Ok(())
}

fn cmd_run(config: &Config, run_id: &RunId) -> Result<()> {
    let data = DataPipeline::from_config(config)?.run()?;
    let outcome = TrainingPipeline::from_config(config)?.run::<TrainingBackend>(
        &data,
        run_id,
        default_device(),
    )?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Run:        {}", run_id);
    println!("  Epochs:     {}", outcome.model.history.len());
    if let Some(last) = outcome.model.history.last() {
        println!("  Accuracy:   {:.2}%", last.accuracy * 100.0);
        if let Some(val) = last.val_accuracy {
            println!("  Val acc:    {:.2}%", val * 100.0);
        }
    }
    match &outcome.model.model_path {
        Some(path) => println!("  Checkpoint: {}", path.display()),
        None => println!("  Checkpoint: {}", "none written".yellow()),
    }
    println!("  Report:     {}", outcome.report_path.display());
    println!("  Curves:     {}", outcome.plot_path.display());
    Ok(())
}

fn cmd_predict(model_path: &Path, image: &Path) -> Result<()> {
    let model = Model::<TrainingBackend>::load(model_path, default_device())?;
    let (class_name, confidence) = Predictor::predict(&model, model.class_names(), image)?;

    println!("{}", "Prediction:".cyan().bold());
    println!("  Image:      {}", image.display());
    println!("  Class:      {}", class_name.green().bold());
    println!("  Confidence: {:.2}%", confidence * 100.0);
    Ok(())
}

fn cmd_download(config: Option<&Config>, dataset: &str, output: Option<PathBuf>) -> Result<()> {
    let output_dir = resolve_output_dir(output, std::env::var(RAW_DATA_PATH_ENV).ok(), config)?;
    download_dataset(dataset, &output_dir)?;
    println!("{} {}", "Downloaded to".green(), output_dir.display());
    Ok(())
}
