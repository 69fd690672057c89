//! Inference strategy abstraction and the memoized inference engine

use crate::{
    assets::ModelAssets,
    config::{ModelGeometry, Normalization},
    error::{BgRemovalError, Result},
};
use ndarray::{Array4, ArrayD};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// A runtime able to load a segmentation model from a file
pub trait InferenceBackend: Send + Sync + fmt::Debug {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Input normalization the runtime's models are trained with
    fn default_normalization(&self) -> Normalization;

    /// Load the model at `model_path`, declaring `geometry` as its input size
    ///
    /// # Errors
    /// - `ModelLoad` if the file is missing, unreadable or not a valid model
    fn load(&self, model_path: &Path, geometry: ModelGeometry) -> Result<Box<dyn LoadedModel>>;
}

/// A loaded model ready for forward passes
///
/// Implementations that cannot run concurrent forward passes serialize
/// access internally.
pub trait LoadedModel: Send + Sync {
    /// Run one forward pass over a `[1, 3, H, W]` tensor
    ///
    /// # Errors
    /// - `Inference` if the runtime fails or returns something that is not
    ///   an `f32` tensor
    fn forward(&self, input: &Array4<f32>) -> Result<ModelOutput>;
}

/// Raw value returned by a forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Tensor(ArrayD<f32>),
    TensorList(Vec<ArrayD<f32>>),
    Tuple(Vec<ModelOutput>),
}

impl ModelOutput {
    /// Select the tensor that carries the mask
    ///
    /// A plain tensor is returned as is. For a tuple, the first element is
    /// taken and then that element's first tensor: a tensor list yields its
    /// first entry and a bare tensor counts as a one-element list. This is
    /// an output contract of the mobile-exported models and is kept exactly.
    ///
    /// # Errors
    /// - `Inference` for empty tuples or lists, nested tuples, or a bare
    ///   tensor list outside a tuple
    pub fn into_primary(self) -> Result<ArrayD<f32>> {
        match self {
            Self::Tensor(tensor) => Ok(tensor),
            Self::TensorList(_) => Err(BgRemovalError::inference(
                "Model returned a tensor list where a tensor or tuple was expected",
            )),
            Self::Tuple(elements) => {
                let first = elements
                    .into_iter()
                    .next()
                    .ok_or_else(|| BgRemovalError::inference("Model returned an empty tuple"))?;
                match first {
                    Self::Tensor(tensor) => Ok(tensor),
                    Self::TensorList(list) => list.into_iter().next().ok_or_else(|| {
                        BgRemovalError::inference("First tuple element is an empty tensor list")
                    }),
                    Self::Tuple(_) => Err(BgRemovalError::inference(
                        "First tuple element is itself a tuple",
                    )),
                }
            }
        }
    }

    /// Primary tensor flattened in row-major (logical) order
    pub fn into_flat(self) -> Result<Vec<f32>> {
        let tensor = self.into_primary()?;
        Ok(tensor.iter().copied().collect())
    }
}

#[derive(Debug)]
enum ModelSource {
    Path(PathBuf),
    Asset {
        assets: Arc<ModelAssets>,
        name: String,
    },
}

impl ModelSource {
    fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Path(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(BgRemovalError::model_load(format!(
                        "Model file not found: {}",
                        path.display()
                    )))
                }
            }
            Self::Asset { assets, name } => assets.asset_file_path(name),
        }
    }
}

/// Owns a backend and the lazily loaded model shared by every `infer` call
///
/// The model is loaded on first use under a mutex, so racing first calls
/// perform exactly one load. A failed load leaves the engine unloaded and
/// the next call tries again.
pub struct InferenceEngine {
    backend: Box<dyn InferenceBackend>,
    source: ModelSource,
    geometry: ModelGeometry,
    handle: Mutex<Option<Arc<dyn LoadedModel>>>,
    loads: AtomicUsize,
}

impl fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend.name())
            .field("source", &self.source)
            .field("geometry", &self.geometry)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl InferenceEngine {
    /// Engine for a model file already on disk
    pub fn new<P: Into<PathBuf>>(
        backend: Box<dyn InferenceBackend>,
        model_path: P,
        geometry: ModelGeometry,
    ) -> Self {
        Self::with_source(backend, ModelSource::Path(model_path.into()), geometry)
    }

    /// Engine for a bundled asset, copied out on first load
    pub fn from_assets<S: Into<String>>(
        backend: Box<dyn InferenceBackend>,
        assets: Arc<ModelAssets>,
        asset_name: S,
        geometry: ModelGeometry,
    ) -> Self {
        Self::with_source(
            backend,
            ModelSource::Asset {
                assets,
                name: asset_name.into(),
            },
            geometry,
        )
    }

    fn with_source(
        backend: Box<dyn InferenceBackend>,
        source: ModelSource,
        geometry: ModelGeometry,
    ) -> Self {
        Self {
            backend,
            source,
            geometry,
            handle: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn default_normalization(&self) -> Normalization {
        self.backend.default_normalization()
    }

    #[must_use]
    pub fn geometry(&self) -> ModelGeometry {
        self.geometry
    }

    /// Whether the model has been loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Number of successful model loads performed by this engine
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Load the model now instead of on the first `infer`
    pub fn warm_up(&self) -> Result<()> {
        self.model().map(|_| ())
    }

    /// Run the model and return its primary output flattened row-major
    ///
    /// # Errors
    /// - `InvalidInput` if the tensor shape differs from the model geometry
    /// - `ModelLoad` if the model cannot be located or loaded
    /// - `Inference` if the backend fails or returns an unusable output
    #[instrument(skip(self, input), fields(backend = self.backend.name()))]
    pub fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let expected = self.geometry.input_shape();
        if input.shape() != expected {
            return Err(BgRemovalError::invalid_input(format!(
                "Input tensor shape {:?} does not match model input {:?}",
                input.shape(),
                expected
            )));
        }

        let model = self.model()?;
        let output = model.forward(input)?.into_flat()?;
        debug!(output_len = output.len(), "forward pass complete");
        Ok(output)
    }

    fn model(&self) -> Result<Arc<dyn LoadedModel>> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| BgRemovalError::internal("Model handle lock poisoned"))?;

        if let Some(model) = guard.as_ref() {
            return Ok(Arc::clone(model));
        }

        let start = Instant::now();
        let path = self.source.resolve()?;
        let model: Arc<dyn LoadedModel> = Arc::from(self.backend.load(&path, self.geometry)?);
        self.loads.fetch_add(1, Ordering::SeqCst);
        info!(
            backend = self.backend.name(),
            model = %path.display(),
            load_ms = start.elapsed().as_millis() as u64,
            "model loaded"
        );

        *guard = Some(Arc::clone(&model));
        Ok(model)
    }
}
