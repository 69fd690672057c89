#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]

//! # bgremove-lite
//!
//! On-device background removal with a single segmentation model.
//!
//! One image goes through five stages:
//!
//! 1. **Encode**: resize to the model resolution and normalize into a
//!    channel-planar `[1, 3, H, W]` tensor ([`TensorCodec`])
//! 2. **Infer**: run the model through a swappable backend ([`InferenceEngine`])
//! 3. **Decode**: read the output as a grayscale probability mask
//! 4. **Binarize**: threshold the mask to foreground/background ([`MaskBinarizer`])
//! 5. **Composite**: keep foreground pixels, make everything else transparent
//!    ([`Compositor`])
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA/CoreML execution providers
//! - `tract` (default): pure Rust backend
//! - `cli` (default): command-line binary and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_lite::{remove_background_from_path, BackendType, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .backend(BackendType::Tract)
//!     .model_path("models/u2netp.onnx")
//!     .build()?;
//! let output = remove_background_from_path("input.jpg", &config).await?;
//! output.image.save("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Long-lived use
//!
//! Loading a model is expensive. Build a [`RemovalPipeline`] once and reuse
//! it (or its clones); the model is loaded on first use and shared after
//! that. Interactive frontends wrap the pipeline in a [`RemovalSession`] and
//! watch its [`RemovalState`].

pub mod assets;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod mask;
pub mod processor;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use image::DynamicImage;
use std::path::Path;

pub use assets::ModelAssets;
pub use backends::{create_backend, MockBackend, MockOutput};
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use codec::TensorCodec;
pub use compositor::{Compositor, TRANSPARENT};
pub use config::{
    BackendType, ExecutionProvider, ModelGeometry, Normalization, RemovalConfig,
    RemovalConfigBuilder, DIM_BATCH_SIZE, DIM_PIXEL_SIZE, IMAGE_HEIGHT, IMAGE_WIDTH,
};
pub use error::{BgRemovalError, ErrorKind, Result};
pub use inference::{InferenceBackend, InferenceEngine, LoadedModel, ModelOutput};
pub use mask::MaskBinarizer;
pub use processor::{PipelineOptions, RemovalPipeline};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use session::{RemovalSession, RemovalState};
pub use types::{MaskKind, ProcessingTimings, RemovalOutput, SegmentationMask};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background of an in-memory image
///
/// Builds a pipeline from `config` for this one call, so the model is
/// loaded every time. Use [`RemovalPipeline`] directly to reuse it.
pub async fn remove_background(
    image: &DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalOutput> {
    let pipeline = RemovalPipeline::from_config(config)?;
    pipeline.process_output(image.to_rgba8()).await
}

/// Load an image file and remove its background
pub async fn remove_background_from_path<P: AsRef<Path>>(
    path: P,
    config: &RemovalConfig,
) -> Result<RemovalOutput> {
    let path = path.as_ref().to_path_buf();
    let image = tokio::task::spawn_blocking(move || ImageIOService::load_image(&path))
        .await
        .map_err(|e| BgRemovalError::internal(format!("Image loading task failed: {e}")))??;
    remove_background(&image, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_model_surfaces_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemovalConfig::builder()
            .backend(BackendType::Tract)
            .model_path(dir.path().join("absent.onnx"))
            .build()
            .unwrap();
        let image = DynamicImage::new_rgb8(4, 4);

        let result = remove_background(&image, &config).await;
        if cfg!(feature = "tract") {
            assert!(matches!(result, Err(BgRemovalError::ModelLoad(_))));
        } else {
            assert!(matches!(result, Err(BgRemovalError::InvalidConfig(_))));
        }
    }

    #[tokio::test]
    async fn test_missing_input_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemovalConfig::default();
        let result = remove_background_from_path(dir.path().join("nope.png"), &config).await;
        assert!(matches!(result, Err(BgRemovalError::Io(_))));
    }
}
