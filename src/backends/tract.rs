//! Tract backend
//!
//! Pure Rust inference over ONNX files. The model is loaded with an explicit
//! `f32 [1, 3, H, W]` input fact, optimized and made runnable once; the
//! resulting plan is immutable and runs concurrently without locking.
//!
//! Models exported with several outputs are reported as a tuple so the
//! engine applies its first-element rule.

use crate::config::{ModelGeometry, Normalization};
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceBackend, LoadedModel, ModelOutput};
use ndarray::{Array4, ArrayD, IxDyn};
use std::path::Path;
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Type alias for the optimized, runnable Tract plan
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract inference strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct TractBackend;

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn default_normalization(&self) -> Normalization {
        Normalization::torchvision()
    }

    fn load(&self, model_path: &Path, geometry: ModelGeometry) -> Result<Box<dyn LoadedModel>> {
        let start = Instant::now();
        let shape = geometry.input_shape();

        let model = onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                BgRemovalError::model_load(format!(
                    "Failed to load ONNX model '{}': {e}",
                    model_path.display()
                ))
            })?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| BgRemovalError::model_load(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::model_load(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgRemovalError::model_load(format!("Failed to create runnable model: {e}"))
            })?;

        log::info!(
            "Tract model {} ready in {}ms (input {:?})",
            model_path.display(),
            start.elapsed().as_millis(),
            shape
        );

        Ok(Box::new(TractLoadedModel { model, shape }))
    }
}

struct TractLoadedModel {
    model: TractModel,
    shape: [usize; 4],
}

impl TractLoadedModel {
    fn to_ndarray(value: &Tensor) -> Result<ArrayD<f32>> {
        let data = value.as_slice::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Model output is not an f32 tensor: {e}"))
        })?;
        ArrayD::from_shape_vec(IxDyn(value.shape()), data.to_vec())
            .map_err(|e| BgRemovalError::inference(format!("Failed to convert output tensor: {e}")))
    }
}

impl LoadedModel for TractLoadedModel {
    fn forward(&self, input: &Array4<f32>) -> Result<ModelOutput> {
        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| BgRemovalError::internal("Input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape::<f32>(&self.shape, data)
            .map_err(|e| BgRemovalError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let mut tensors = outputs
            .iter()
            .map(|value| Self::to_ndarray(value))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Tract forward produced {} output(s)", tensors.len());

        match tensors.len() {
            0 => Err(BgRemovalError::inference("Model produced no outputs")),
            1 => Ok(ModelOutput::Tensor(tensors.remove(0))),
            _ => Ok(ModelOutput::Tuple(
                tensors.into_iter().map(ModelOutput::Tensor).collect(),
            )),
        }
    }
}
