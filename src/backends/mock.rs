//! Mock backend implementation for testing and debugging
//!
//! Produces scripted outputs without a model runtime, counts loads and
//! forward passes, and can be told to fail. Any existing file works as the
//! "model" path.

use crate::config::{ModelGeometry, Normalization};
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceBackend, LoadedModel, ModelOutput};
use ndarray::{Array4, ArrayD, IxDyn};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a mock model returns from `forward`
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// Every output value set to this probability, shaped `[1, 1, H, W]`
    Constant(f32),
    /// These exact values as a flat tensor
    Values(Vec<f32>),
    /// A fully scripted output, returned as is
    Raw(ModelOutput),
    /// Foreground where the normalized red channel is positive
    RedChannel,
    /// Fail every forward pass with this message
    Fail(String),
}

/// Mock backend for testing and debugging purposes
#[derive(Debug, Clone)]
pub struct MockBackend {
    output: MockOutput,
    normalization: Normalization,
    load_delay: Option<Duration>,
    forward_delay: Option<Duration>,
    failing_loads: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    forwards: Arc<AtomicUsize>,
}

impl MockBackend {
    #[must_use]
    pub fn new(output: MockOutput) -> Self {
        Self {
            output,
            normalization: Normalization::centered(),
            load_delay: None,
            forward_delay: None,
            failing_loads: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
            forwards: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn constant(probability: f32) -> Self {
        Self::new(MockOutput::Constant(probability))
    }

    #[must_use]
    pub fn with_values(values: Vec<f32>) -> Self {
        Self::new(MockOutput::Values(values))
    }

    #[must_use]
    pub fn with_output(output: ModelOutput) -> Self {
        Self::new(MockOutput::Raw(output))
    }

    #[must_use]
    pub fn red_channel() -> Self {
        Self::new(MockOutput::RedChannel)
    }

    #[must_use]
    pub fn failing_forward<S: Into<String>>(message: S) -> Self {
        Self::new(MockOutput::Fail(message.into()))
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Sleep inside `load`, widening the window for racing first calls
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Sleep inside every forward pass
    #[must_use]
    pub fn with_forward_delay(mut self, delay: Duration) -> Self {
        self.forward_delay = Some(delay);
        self
    }

    /// Fail the next `count` loads with `ModelLoad`
    #[must_use]
    pub fn fail_first_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    /// Shared counter of successful loads
    #[must_use]
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    /// Shared counter of forward passes
    #[must_use]
    pub fn forward_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.forwards)
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_normalization(&self) -> Normalization {
        self.normalization
    }

    fn load(&self, model_path: &Path, geometry: ModelGeometry) -> Result<Box<dyn LoadedModel>> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let should_fail = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BgRemovalError::model_load(format!(
                "Mock load failure for {}",
                model_path.display()
            )));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModel {
            output: self.output.clone(),
            geometry,
            forward_delay: self.forward_delay,
            forwards: Arc::clone(&self.forwards),
        }))
    }
}

struct MockModel {
    output: MockOutput,
    geometry: ModelGeometry,
    forward_delay: Option<Duration>,
    forwards: Arc<AtomicUsize>,
}

impl MockModel {
    fn mask_shape(&self) -> IxDyn {
        IxDyn(&[1, 1, self.geometry.height as usize, self.geometry.width as usize])
    }

    fn shaped(&self, values: Vec<f32>) -> Result<ArrayD<f32>> {
        ArrayD::from_shape_vec(self.mask_shape(), values)
            .map_err(|e| BgRemovalError::inference(format!("Mock output shape error: {e}")))
    }
}

impl LoadedModel for MockModel {
    fn forward(&self, input: &Array4<f32>) -> Result<ModelOutput> {
        self.forwards.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.forward_delay {
            std::thread::sleep(delay);
        }

        match &self.output {
            MockOutput::Constant(value) => Ok(ModelOutput::Tensor(
                self.shaped(vec![*value; self.geometry.output_len()])?,
            )),
            MockOutput::Values(values) => Ok(ModelOutput::Tensor(
                ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.clone()).map_err(|e| {
                    BgRemovalError::inference(format!("Mock output shape error: {e}"))
                })?,
            )),
            MockOutput::Raw(output) => Ok(output.clone()),
            MockOutput::RedChannel => {
                let (_, _, height, width) = input.dim();
                let mut values = Vec::with_capacity(height * width);
                for y in 0..height {
                    for x in 0..width {
                        let red = input.get([0, 0, y, x]).copied().unwrap_or(0.0);
                        values.push(if red > 0.0 { 1.0 } else { 0.0 });
                    }
                }
                Ok(ModelOutput::Tensor(self.shaped(values)?))
            }
            MockOutput::Fail(message) => Err(BgRemovalError::inference(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(backend: &MockBackend, geometry: ModelGeometry) -> Box<dyn LoadedModel> {
        backend.load(Path::new("mock.onnx"), geometry).unwrap()
    }

    #[test]
    fn test_constant_output_shape() {
        let backend = MockBackend::constant(0.25);
        let model = load(&backend, ModelGeometry::new(3, 2));
        let output = model
            .forward(&Array4::zeros((1, 3, 2, 3)))
            .unwrap()
            .into_primary()
            .unwrap();
        assert_eq!(output.shape(), &[1, 1, 2, 3]);
        assert!(output.iter().all(|&v| (v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_red_channel_output() {
        let backend = MockBackend::red_channel();
        let model = load(&backend, ModelGeometry::new(2, 1));
        let mut input = Array4::from_elem((1, 3, 1, 2), -0.5_f32);
        input[[0, 0, 0, 1]] = 0.5;
        let flat = model.forward(&input).unwrap().into_flat().unwrap();
        assert_eq!(flat, vec![0.0, 1.0]);
    }

    #[test]
    fn test_counters_and_failures() {
        let backend = MockBackend::failing_forward("boom").fail_first_loads(2);
        let loads = backend.load_counter();
        let forwards = backend.forward_counter();
        let geometry = ModelGeometry::new(1, 1);

        assert!(backend.load(Path::new("m"), geometry).is_err());
        assert!(backend.load(Path::new("m"), geometry).is_err());
        let model = load(&backend, geometry);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let err = model.forward(&Array4::zeros((1, 3, 1, 1))).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
        assert_eq!(forwards.load(Ordering::SeqCst), 1);
    }
}
