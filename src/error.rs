//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Coarse error category, kept for diagnostics and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ModelLoad,
    Inference,
    OutOfBounds,
    Postprocess,
    Io,
    Image,
    InvalidConfig,
    Internal,
    Cancelled,
}

/// Error types for every stage of the removal pipeline
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Malformed or empty source image
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model asset missing, unreadable or rejected by the runtime
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Backend failed or returned an output the engine cannot interpret
    #[error("Inference error: {0}")]
    Inference(String),

    /// Decode needed more output values than the model produced
    #[error("Output index {index} is out of bounds for buffer of length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Mask construction failed for a reason not covered above
    #[error("Postprocess error: {0}")]
    Postprocess(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),

    /// The job was abandoned before it produced a result
    #[error("Processing cancelled")]
    Cancelled,
}

impl BgRemovalError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new out-of-bounds error
    #[must_use]
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::OutOfBounds { index, len }
    }

    /// Create a new postprocess error
    pub fn postprocess<S: Into<String>>(msg: S) -> Self {
        Self::Postprocess(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Error category, independent of the message
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::Inference(_) => ErrorKind::Inference,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::Postprocess(_) => ErrorKind::Postprocess,
            Self::Io(_) => ErrorKind::Io,
            Self::Image(_) => ErrorKind::Image,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
