//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model input width in pixels
pub const IMAGE_WIDTH: u32 = 320;
/// Model input height in pixels
pub const IMAGE_HEIGHT: u32 = 320;
/// Batch dimension of every tensor the pipeline builds
pub const DIM_BATCH_SIZE: usize = 1;
/// Channel dimension of the input tensor (RGB)
pub const DIM_PIXEL_SIZE: usize = 3;

/// Default model asset name inside the bundle directory
pub const DEFAULT_MODEL_ASSET: &str = "model.onnx";

/// Fixed spatial resolution of the segmentation model
///
/// Encode resizes to this resolution, the engine declares it as the input
/// shape and decode assumes the output is laid out at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelGeometry {
    pub width: u32,
    pub height: u32,
}

impl ModelGeometry {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Input tensor shape `[batch, channels, height, width]`
    #[must_use]
    pub fn input_shape(&self) -> [usize; 4] {
        [
            DIM_BATCH_SIZE,
            DIM_PIXEL_SIZE,
            self.height as usize,
            self.width as usize,
        ]
    }

    /// Number of input tensor elements
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.input_shape().iter().product()
    }

    /// Number of single-channel output values decode reads
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for ModelGeometry {
    fn default() -> Self {
        Self::new(IMAGE_WIDTH, IMAGE_HEIGHT)
    }
}

/// Per-channel normalization applied after scaling pixels to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Mean 0.5, unit std (ONNX Runtime backend convention)
    #[must_use]
    pub fn centered() -> Self {
        Self {
            mean: [0.5, 0.5, 0.5],
            std: [1.0, 1.0, 1.0],
        }
    }

    /// Torchvision ImageNet statistics (mobile runtime convention)
    #[must_use]
    pub fn torchvision() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    /// Reject zero, negative or non-finite std and non-finite mean components
    pub fn validate(&self) -> Result<()> {
        for (c, value) in self.std.iter().enumerate() {
            if !value.is_finite() || *value <= 0.0 {
                return Err(BgRemovalError::config_value_error(
                    &format!("std[{c}]"),
                    value,
                    "> 0",
                ));
            }
        }
        for (c, value) in self.mean.iter().enumerate() {
            if !value.is_finite() {
                return Err(BgRemovalError::config_value_error(
                    &format!("mean[{c}]"),
                    value,
                    "finite",
                ));
            }
        }
        Ok(())
    }
}

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        Self::Onnx
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend '{other}' (expected onnx or tract)"
            ))),
        }
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Inference backend strategy
    pub backend: BackendType,

    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,

    /// Explicit model file; bypasses asset resolution when set
    pub model_path: Option<PathBuf>,

    /// Asset name resolved through `ModelAssets` when `model_path` is unset
    pub model_asset: String,

    /// Directory holding bundled (read-only) assets
    pub bundle_dir: Option<PathBuf>,

    /// Writable directory assets are copied into (None = platform cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Model input/output resolution
    pub geometry: ModelGeometry,

    /// Normalization override; None uses the backend's default
    pub normalization: Option<Normalization>,

    /// Mask values strictly greater than this become foreground
    pub mask_threshold: u8,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            model_path: None,
            model_asset: DEFAULT_MODEL_ASSET.to_string(),
            bundle_dir: None,
            cache_dir: None,
            geometry: ModelGeometry::default(),
            normalization: None,
            mask_threshold: 0,
            intra_threads: 0,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_lite::{BackendType, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .backend(BackendType::Tract)
    ///     .model_path("models/u2netp.onnx")
    ///     .mask_threshold(127)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.mask_threshold, 127);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.geometry.width == 0 || self.geometry.height == 0 {
            return Err(BgRemovalError::invalid_config(format!(
                "Model geometry must be non-zero, got {}x{}",
                self.geometry.width, self.geometry.height
            )));
        }
        if self.model_path.is_none() && self.model_asset.trim().is_empty() {
            return Err(BgRemovalError::invalid_config(
                "Either model_path or model_asset must be set",
            ));
        }
        if let Some(normalization) = &self.normalization {
            normalization.validate()?;
        }
        Ok(())
    }

    /// Normalization the codec should use for this configuration
    #[must_use]
    pub fn resolved_normalization(&self) -> Normalization {
        self.normalization.unwrap_or(match self.backend {
            BackendType::Onnx => Normalization::centered(),
            BackendType::Tract => Normalization::torchvision(),
        })
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn model_asset<S: Into<String>>(mut self, name: S) -> Self {
        self.config.model_asset = name.into();
        self
    }

    #[must_use]
    pub fn bundle_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.bundle_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn geometry(mut self, width: u32, height: u32) -> Self {
        self.config.geometry = ModelGeometry::new(width, height);
        self
    }

    #[must_use]
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.config.normalization = Some(normalization);
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: u8) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.backend, BackendType::Onnx);
        assert_eq!(config.geometry, ModelGeometry::new(IMAGE_WIDTH, IMAGE_HEIGHT));
        assert_eq!(config.mask_threshold, 0);
        assert_eq!(config.model_asset, DEFAULT_MODEL_ASSET);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_geometry_shapes() {
        let geometry = ModelGeometry::new(4, 2);
        assert_eq!(geometry.input_shape(), [1, 3, 2, 4]);
        assert_eq!(geometry.input_len(), 24);
        assert_eq!(geometry.output_len(), 8);
    }

    #[test]
    fn test_resolved_normalization_per_backend() {
        let onnx = RemovalConfig::default();
        assert_eq!(onnx.resolved_normalization(), Normalization::centered());

        let tract = RemovalConfig::builder()
            .backend(BackendType::Tract)
            .build()
            .unwrap();
        assert_eq!(tract.resolved_normalization(), Normalization::torchvision());

        let custom = Normalization {
            mean: [0.0; 3],
            std: [0.5; 3],
        };
        let overridden = RemovalConfig::builder()
            .backend(BackendType::Tract)
            .normalization(custom)
            .build()
            .unwrap();
        assert_eq!(overridden.resolved_normalization(), custom);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RemovalConfig::builder().geometry(0, 320).build().is_err());

        let zero_std = Normalization {
            mean: [0.5; 3],
            std: [1.0, 0.0, 1.0],
        };
        let err = RemovalConfig::builder()
            .normalization(zero_std)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("std[1]"));

        assert!(RemovalConfig::builder().model_asset("  ").build().is_err());
        assert!(RemovalConfig::builder()
            .model_asset("")
            .model_path("/tmp/model.onnx")
            .build()
            .is_ok());
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("onnx".parse::<BackendType>().unwrap(), BackendType::Onnx);
        assert_eq!("TRACT".parse::<BackendType>().unwrap(), BackendType::Tract);
        assert!("pytorch".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Tract.to_string(), "tract");
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "backend": "tract", "mask_threshold": 10, "geometry": { "width": 256, "height": 256 } }"#,
        )
        .unwrap();

        let config = RemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend, BackendType::Tract);
        assert_eq!(config.mask_threshold, 10);
        assert_eq!(config.geometry, ModelGeometry::new(256, 256));
        assert_eq!(config.model_asset, DEFAULT_MODEL_ASSET);
    }

    #[test]
    fn test_json_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(RemovalConfig::from_json_file(&path).is_err());
        assert!(RemovalConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
