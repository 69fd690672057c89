//! Conversion from CLI arguments to `RemovalConfig`

use crate::cli::main_impl::Cli;
use crate::config::RemovalConfig;
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply every explicit flag
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(backend) = cli.backend {
            config.backend = backend.into();
        }
        if let Some(provider) = cli.execution_provider {
            config.execution_provider = provider.into();
        }
        if let Some(model) = &cli.model {
            config.model_path = Some(model.clone());
        }
        if let Some(asset) = &cli.asset {
            config.model_asset = asset.clone();
        }
        if let Some(dir) = &cli.bundle_dir {
            config.bundle_dir = Some(dir.clone());
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(threshold) = cli.threshold {
            config.mask_threshold = threshold;
        }
        if let Some(threads) = cli.threads {
            config.intra_threads = threads;
        }
        if let Some(size) = &cli.size {
            let (width, height) = Self::parse_size(size)?;
            config.geometry.width = width;
            config.geometry.height = height;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse `WIDTHxHEIGHT` (or a single number for a square size)
    pub(crate) fn parse_size(size: &str) -> Result<(u32, u32)> {
        let size = size.trim().to_ascii_lowercase();
        let (width, height) = match size.split_once('x') {
            Some((w, h)) => (w.trim(), h.trim()),
            None => (size.as_str(), size.as_str()),
        };
        let width: u32 = width
            .parse()
            .with_context(|| format!("Invalid width in size '{size}'"))?;
        let height: u32 = height
            .parse()
            .with_context(|| format!("Invalid height in size '{size}'"))?;
        if width == 0 || height == 0 {
            anyhow::bail!("Size must be non-zero, got {width}x{height}");
        }
        Ok((width, height))
    }
}
