//! Background removal pipeline
//!
//! `RemovalPipeline` runs encode, inference, decode, binarize and composite
//! for one image. Any stage failure ends the run with that error; no stage
//! retries and no partial image is produced.

use crate::{
    assets::ModelAssets,
    backends::create_backend,
    codec::TensorCodec,
    compositor::Compositor,
    config::{ModelGeometry, Normalization, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::InferenceEngine,
    mask::MaskBinarizer,
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    types::{ProcessingTimings, RemovalOutput, SegmentationMask},
};
use futures::stream::{self, Stream};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Level};

/// Per-pipeline settings for the pure stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    /// Must match the engine's geometry
    pub geometry: ModelGeometry,
    pub normalization: Normalization,
    /// Mask values strictly greater than this are foreground
    pub mask_threshold: u8,
}

impl PipelineOptions {
    #[must_use]
    pub fn from_config(config: &RemovalConfig) -> Self {
        Self {
            geometry: config.geometry,
            normalization: config.resolved_normalization(),
            mask_threshold: config.mask_threshold,
        }
    }

    /// Defaults matching an engine: its geometry and backend normalization
    #[must_use]
    pub fn for_engine(engine: &InferenceEngine) -> Self {
        Self {
            geometry: engine.geometry(),
            normalization: engine.default_normalization(),
            mask_threshold: 0,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            geometry: ModelGeometry::default(),
            normalization: Normalization::centered(),
            mask_threshold: 0,
        }
    }
}

/// Orchestrates the stages of one background removal
///
/// Cloning is cheap; clones share the engine and therefore the loaded model.
#[derive(Clone)]
pub struct RemovalPipeline {
    engine: Arc<InferenceEngine>,
    codec: TensorCodec,
    binarizer: MaskBinarizer,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for RemovalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalPipeline")
            .field("engine", &self.engine)
            .field("codec", &self.codec)
            .field("binarizer", &self.binarizer)
            .finish_non_exhaustive()
    }
}

impl RemovalPipeline {
    /// # Errors
    /// - `InvalidConfig` if the options' geometry differs from the engine's
    ///   or the normalization is invalid
    pub fn new(engine: Arc<InferenceEngine>, options: PipelineOptions) -> Result<Self> {
        if options.geometry != engine.geometry() {
            return Err(BgRemovalError::invalid_config(format!(
                "Pipeline geometry {}x{} does not match engine geometry {}x{}",
                options.geometry.width,
                options.geometry.height,
                engine.geometry().width,
                engine.geometry().height
            )));
        }
        options.normalization.validate()?;

        Ok(Self {
            engine,
            codec: TensorCodec::new(options.geometry, options.normalization),
            binarizer: MaskBinarizer::new(options.mask_threshold),
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Build the backend, engine and pipeline described by `config`
    ///
    /// The model is not loaded here; the first run (or
    /// `engine().warm_up()`) loads it.
    pub fn from_config(config: &RemovalConfig) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(config.backend, config)?;

        let engine = match &config.model_path {
            Some(path) => InferenceEngine::new(backend, path.clone(), config.geometry),
            None => InferenceEngine::from_assets(
                backend,
                Arc::new(ModelAssets::from_config(config)?),
                config.model_asset.clone(),
                config.geometry,
            ),
        };

        info!(
            backend = %config.backend,
            width = config.geometry.width,
            height = config.geometry.height,
            threshold = config.mask_threshold,
            "pipeline configured"
        );

        Self::new(Arc::new(engine), PipelineOptions::from_config(config))
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    #[must_use]
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            geometry: self.codec.geometry(),
            normalization: self.codec.normalization(),
            mask_threshold: self.binarizer.threshold(),
        }
    }

    /// Run every stage on the calling thread
    ///
    /// CPU-bound and possibly slow on first use (model load); call from a
    /// worker, not from a thread driving a UI or an async executor.
    #[instrument(
        skip(self, image),
        fields(
            backend = self.engine.backend_name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_blocking(&self, image: &RgbaImage) -> Result<RemovalOutput> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        tracker.report_stage(ProcessingStage::Started);

        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        match self.run_stages(image, &mut tracker, &mut timings) {
            Ok((result, mask)) => {
                timings.total_ms = total_start.elapsed().as_millis() as u64;
                info!(
                    total_ms = timings.total_ms,
                    foreground_ratio = mask.foreground_ratio(),
                    "background removed"
                );
                tracker.report_completion(timings.clone());
                Ok(RemovalOutput {
                    image: result,
                    mask,
                    timings,
                })
            },
            Err(err) => {
                warn!(stage = ?tracker.current_stage(), kind = ?err.kind(), "pipeline failed: {err}");
                tracker.report_error(&err.to_string());
                Err(err)
            },
        }
    }

    /// Convenience for callers holding a `DynamicImage`
    pub fn process_dynamic(&self, image: &DynamicImage) -> Result<RemovalOutput> {
        self.process_blocking(&image.to_rgba8())
    }

    fn run_stages(
        &self,
        image: &RgbaImage,
        tracker: &mut ProgressTracker,
        timings: &mut ProcessingTimings,
    ) -> Result<(RgbaImage, SegmentationMask)> {
        let geometry = self.codec.geometry();

        let tensor = {
            let _span = span!(
                Level::DEBUG,
                "encode",
                target_width = geometry.width,
                target_height = geometry.height
            )
            .entered();
            tracker.report_stage(ProcessingStage::Preprocessing);
            let start = Instant::now();
            let tensor = self.codec.encode(image)?;
            timings.encode_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let output = {
            let _span = span!(Level::INFO, "inference", backend = self.engine.backend_name())
                .entered();
            tracker.report_stage(ProcessingStage::Inference);
            let start = Instant::now();
            let output = self.engine.infer(&tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            output
        };

        let grayscale = {
            let _span = span!(Level::DEBUG, "decode", output_len = output.len()).entered();
            tracker.report_stage(ProcessingStage::MaskGeneration);
            let start = Instant::now();
            let mask = self.codec.decode(&output)?;
            timings.decode_ms = start.elapsed().as_millis() as u64;
            mask
        };

        let binary = {
            let _span = span!(Level::DEBUG, "binarize", threshold = self.binarizer.threshold())
                .entered();
            tracker.report_stage(ProcessingStage::Binarization);
            let start = Instant::now();
            let mask = self.binarizer.binarize(&grayscale);
            timings.binarize_ms = start.elapsed().as_millis() as u64;
            mask
        };

        let result = {
            let _span = span!(
                Level::DEBUG,
                "composite",
                width = image.width(),
                height = image.height()
            )
            .entered();
            tracker.report_stage(ProcessingStage::Compositing);
            let start = Instant::now();
            let result = Compositor::merge(image, &binary)?;
            timings.composite_ms = start.elapsed().as_millis() as u64;
            result
        };

        debug!(?timings, "stages complete");
        Ok((result, binary))
    }

    /// Run the pipeline on the blocking pool and wait for the full output
    ///
    /// # Errors
    /// - any stage error
    /// - `Cancelled` if the blocking task was cancelled by runtime shutdown
    pub async fn process_output(&self, image: RgbaImage) -> Result<RemovalOutput> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process_blocking(&image))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    BgRemovalError::Cancelled
                } else {
                    BgRemovalError::internal(format!("Pipeline worker panicked: {e}"))
                }
            })?
    }

    /// Lazy single-result stream of the processed image
    ///
    /// Nothing runs until the stream is first polled. It then yields exactly
    /// one item, the result image or the first stage error, and ends.
    /// Dropping the stream abandons the result; a forward pass already
    /// running on the blocking pool finishes but is never observed.
    pub fn process(&self, image: RgbaImage) -> impl Stream<Item = Result<RgbaImage>> + Send + 'static {
        let pipeline = self.clone();
        stream::once(async move {
            pipeline
                .process_output(image)
                .await
                .map(|output| output.image)
        })
    }
}
