//! Inference strategies
//!
//! - ONNX Runtime backend (GPU acceleration through execution providers)
//! - Tract backend (pure Rust, no external dependencies)
//! - Mock backend (scripted outputs for tests and debugging)

use crate::config::{BackendType, RemovalConfig};
use crate::error::Result;
use crate::inference::InferenceBackend;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::mock::{MockBackend, MockOutput};

/// Instantiate the strategy selected by `backend_type`
///
/// # Errors
/// - `InvalidConfig` if the crate was built without the backend's feature
#[cfg_attr(not(feature = "onnx"), allow(unused_variables))]
pub fn create_backend(
    backend_type: BackendType,
    config: &RemovalConfig,
) -> Result<Box<dyn InferenceBackend>> {
    match backend_type {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(OnnxBackend::new(
            config.execution_provider,
            config.intra_threads,
        ))),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(TractBackend::new())),
        #[allow(unreachable_patterns)]
        other => Err(crate::error::BgRemovalError::invalid_config(format!(
            "Backend '{other}' is not enabled in this build"
        ))),
    }
}
