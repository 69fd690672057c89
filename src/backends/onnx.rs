//! ONNX Runtime backend
//!
//! Builds one session per loaded model from the model file, with the
//! configured execution provider and thread count. The session is held by
//! the loaded model and released when the model handle is dropped.

use crate::config::{ExecutionProvider, ModelGeometry, Normalization};
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceBackend, LoadedModel, ModelOutput};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

/// ONNX Runtime inference strategy
#[derive(Debug, Clone, Default)]
pub struct OnnxBackend {
    execution_provider: ExecutionProvider,
    intra_threads: usize,
}

impl OnnxBackend {
    #[must_use]
    pub fn new(execution_provider: ExecutionProvider, intra_threads: usize) -> Self {
        Self {
            execution_provider,
            intra_threads,
        }
    }

    fn configure_providers(&self, builder: SessionBuilder) -> Result<SessionBuilder> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
        };

        let providers = match self.execution_provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    vec![CUDAExecutionProvider::default().build()]
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    vec![CoreMLExecutionProvider::default().with_subgraphs(true).build()]
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
        };

        if providers.is_empty() {
            return Ok(builder);
        }
        builder.with_execution_providers(providers).map_err(|e| {
            BgRemovalError::model_load(format!("Failed to set execution providers: {e}"))
        })
    }

    fn intra_threads(&self) -> usize {
        if self.intra_threads > 0 {
            self.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn default_normalization(&self) -> Normalization {
        Normalization::centered()
    }

    fn load(&self, model_path: &Path, geometry: ModelGeometry) -> Result<Box<dyn LoadedModel>> {
        let builder = Session::builder()
            .map_err(|e| BgRemovalError::model_load(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::model_load(format!("Failed to set optimization level: {e}"))
            })?;

        let intra_threads = self.intra_threads();
        let session = self
            .configure_providers(builder)?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::model_load(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                BgRemovalError::model_load(format!(
                    "Failed to load ONNX model '{}': {e}",
                    model_path.display()
                ))
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| BgRemovalError::model_load("ONNX model declares no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| BgRemovalError::model_load("ONNX model declares no outputs"))?;
        if session.outputs.len() > 1 {
            log::debug!(
                "Model has {} outputs, using the first ({output_name})",
                session.outputs.len()
            );
        }

        log::debug!(
            "ONNX session ready: input '{input_name}' {:?}, output '{output_name}', {intra_threads} intra-op threads",
            geometry.input_shape()
        );

        Ok(Box::new(OnnxModel {
            session: Mutex::new(session),
            input_name,
            output_name,
        }))
    }
}

/// Loaded ONNX session; `Session::run` needs exclusive access
struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl LoadedModel for OnnxModel {
    fn forward(&self, input: &Array4<f32>) -> Result<ModelOutput> {
        let input_value = Value::from_array(input.clone())
            .map_err(|e| BgRemovalError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgRemovalError::internal("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                BgRemovalError::inference(format!("Output '{}' not found", self.output_name))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::inference(format!("Output is not an f32 tensor: {e}"))
            })?
            .to_owned();

        Ok(ModelOutput::Tensor(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults() {
        let backend = OnnxBackend::default();
        assert_eq!(backend.name(), "onnx");
        assert_eq!(backend.default_normalization(), Normalization::centered());
        assert!(backend.intra_threads() >= 1);
        assert_eq!(OnnxBackend::new(ExecutionProvider::Cpu, 3).intra_threads(), 3);
    }

    #[test]
    fn test_invalid_model_file_is_model_load_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an onnx model").unwrap();
        let backend = OnnxBackend::new(ExecutionProvider::Cpu, 1);
        match backend.load(file.path(), ModelGeometry::default()) {
            Err(BgRemovalError::ModelLoad(_)) => {},
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("garbage bytes must not load"),
        }
    }
}
