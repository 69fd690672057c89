//! Background removal CLI tool
//!
//! Runs one image through a `RemovalSession` and writes the PNG result.

use super::config::CliConfigBuilder;
use crate::{
    assets::ModelAssets,
    config::{BackendType, ExecutionProvider},
    processor::RemovalPipeline,
    services::{ConsoleProgressReporter, ImageIOService},
    session::RemovalSession,
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Remove the background from an image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-lite")]
pub struct Cli {
    /// Input image (PNG, JPEG or TIFF)
    #[arg(value_name = "INPUT", required_unless_present = "show_cache_dir")]
    pub input: Option<PathBuf>,

    /// Output PNG [default: <INPUT>_nobg.png]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Execution provider (ONNX Runtime only)
    #[arg(short, long, value_enum)]
    pub execution_provider: Option<CliProvider>,

    /// Model file; bypasses bundled asset lookup
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Bundled model asset name
    #[arg(long, value_name = "NAME")]
    pub asset: Option<String>,

    /// Directory holding bundled model assets
    #[arg(long, value_name = "PATH")]
    pub bundle_dir: Option<PathBuf>,

    /// Directory bundled assets are copied into
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Mask values above this become foreground (0-255)
    #[arg(long)]
    pub threshold: Option<u8>,

    /// Model input size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH")]
    pub size: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Log each pipeline stage
    #[arg(long)]
    pub progress: bool,

    /// Print the default asset cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
}

impl From<CliBackend> for BackendType {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Onnx => BackendType::Onnx,
            CliBackend::Tract => BackendType::Tract,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliProvider {
    Auto,
    Cpu,
    Cuda,
    Coreml,
}

impl From<CliProvider> for ExecutionProvider {
    fn from(provider: CliProvider) -> Self {
        match provider {
            CliProvider::Auto => ExecutionProvider::Auto,
            CliProvider::Cpu => ExecutionProvider::Cpu,
            CliProvider::Cuda => ExecutionProvider::Cuda,
            CliProvider::Coreml => ExecutionProvider::CoreMl,
        }
    }
}

/// CLI entry point
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_cache_dir {
        let dir = match &cli.cache_dir {
            Some(dir) => dir.clone(),
            None => ModelAssets::default_files_dir().context("No cache directory available")?,
        };
        println!("{}", dir.display());
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input image is required")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| ImageIOService::default_output_path(&input));

    info!("Input: {}", input.display());
    info!(
        "Backend: {}, Provider: {}, Model size: {}x{}",
        config.backend,
        config.execution_provider,
        config.geometry.width,
        config.geometry.height
    );

    let start_time = Instant::now();
    let image = ImageIOService::load_image(&input)
        .with_context(|| format!("Failed to load image {}", input.display()))?;

    let mut pipeline =
        RemovalPipeline::from_config(&config).context("Failed to create pipeline")?;
    if cli.progress {
        pipeline =
            pipeline.with_progress_reporter(Arc::new(ConsoleProgressReporter::new(cli.verbose > 0)));
    }

    let session = RemovalSession::new(pipeline);
    let mut state = session.subscribe();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message(format!("Removing background from {}", input.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    session
        .remove_background(image.to_rgba8())
        .context("Failed to start background removal")?;
    let final_state = state
        .wait_for(|s| !s.is_loading)
        .await
        .context("Removal session closed unexpectedly")?
        .clone();
    spinner.finish_and_clear();

    if final_state.has_error {
        anyhow::bail!(
            "Background removal failed for {}: {}",
            input.display(),
            final_state
                .error_message
                .as_deref()
                .unwrap_or("unknown error")
        );
    }

    let result = final_state
        .result_image
        .context("Background removal finished without a result")?;
    ImageIOService::save_png(&result, &output_path)
        .with_context(|| format!("Failed to save {}", output_path.display()))?;

    debug!(elapsed_ms = start_time.elapsed().as_millis() as u64, "cli run complete");
    info!(
        "Processed {} -> {} in {:.2}s",
        input.display(),
        output_path.display(),
        start_time.elapsed().as_secs_f64()
    );
    println!("{}", output_path.display());

    Ok(())
}
