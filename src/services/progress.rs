//! Progress reporting service
//!
//! Keeps progress reporting out of the pipeline stages so each frontend
//! decides how (or whether) to show it.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Progress stages of one background removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Work accepted and scheduled on a worker
    Started,
    /// Resizing and normalizing the image into a tensor
    Preprocessing,
    /// Running the model (loads it on first use)
    Inference,
    /// Converting the output tensor to a grayscale mask
    MaskGeneration,
    /// Thresholding the mask to foreground/background
    Binarization,
    /// Applying the mask to the original image
    Compositing,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Started => "Starting background removal",
            ProcessingStage::Preprocessing => "Preprocessing image",
            ProcessingStage::Inference => "Running inference",
            ProcessingStage::MaskGeneration => "Generating segmentation mask",
            ProcessingStage::Binarization => "Binarizing mask",
            ProcessingStage::Compositing => "Removing background",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Started => 0,
            ProcessingStage::Preprocessing => 10,
            ProcessingStage::Inference => 30,
            ProcessingStage::MaskGeneration => 80,
            ProcessingStage::Binarization => 85,
            ProcessingStage::Compositing => 90,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Receives progress for one or more background removals
pub trait ProgressReporter: Send + Sync {
    /// Report entry into a stage
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report the failure that ended processing at `stage`
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Reports progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// `verbose` adds elapsed times and the per-stage timing breakdown
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  Encode: {}ms", timings.encode_ms);
            log::info!("  Inference: {}ms", timings.inference_ms);
            log::info!("  Decode: {}ms", timings.decode_ms);
            log::info!("  Binarize: {}ms", timings.binarize_ms);
            log::info!("  Composite: {}ms", timings.composite_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Tracks the current stage and elapsed time for one run
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_completion(&mut self, timings: ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error against the stage that was running
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Started);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
