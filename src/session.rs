//! Caller-facing session state for interactive frontends
//!
//! A `RemovalSession` publishes one `RemovalState` value through a watch
//! channel. Each `remove_background` call replaces any in-flight job; only
//! the latest job may publish its outcome.

use crate::{
    error::{BgRemovalError, Result},
    processor::RemovalPipeline,
};
use futures::StreamExt;
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Observable state of a session
///
/// `result_image` survives later loading and error states, so the last good
/// result stays visible until a new one replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalState {
    pub result_image: Option<Arc<RgbaImage>>,
    pub is_loading: bool,
    pub has_error: bool,
    /// Display text of the last failure, cleared when a new job starts
    pub error_message: Option<String>,
}

impl RemovalState {
    /// No job running
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.is_loading
    }
}

/// Runs background removals for one caller and publishes their state
pub struct RemovalSession {
    pipeline: RemovalPipeline,
    state: Arc<watch::Sender<RemovalState>>,
    generation: Arc<AtomicU64>,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RemovalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalSession")
            .field("pipeline", &self.pipeline)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl RemovalSession {
    #[must_use]
    pub fn new(pipeline: RemovalPipeline) -> Self {
        let (state, _) = watch::channel(RemovalState::default());
        Self {
            pipeline,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            job: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &RemovalPipeline {
        &self.pipeline
    }

    /// Receiver observing every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RemovalState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> RemovalState {
        self.state.borrow().clone()
    }

    /// Start removing the background of `image`
    ///
    /// Publishes a loading state immediately and returns; the outcome is
    /// published when the job finishes. A job still in flight from an
    /// earlier call is aborted and can no longer publish.
    ///
    /// # Errors
    /// - `Internal` if called outside a Tokio runtime
    pub fn remove_background(&self, image: RgbaImage) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BgRemovalError::internal(format!("RemovalSession requires a Tokio runtime: {e}"))
        })?;

        let mut job = self
            .job
            .lock()
            .map_err(|_| BgRemovalError::internal("Session job lock poisoned"))?;

        if let Some(previous) = job.take() {
            if !previous.is_finished() {
                debug!("replacing in-flight removal");
            }
            previous.abort();
        }

        // Generation changes under the channel lock so a superseded job
        // cannot publish after this loading state
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.is_loading = true;
            state.has_error = false;
            state.error_message = None;
        });

        let results = self.pipeline.process(image);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);

        *job = Some(runtime.spawn(async move {
            futures::pin_mut!(results);
            let outcome = results.next().await;

            state.send_if_modified(|state| {
                if current.load(Ordering::SeqCst) != generation {
                    debug!(generation, "discarding superseded result");
                    return false;
                }
                state.is_loading = false;
                match outcome {
                    Some(Ok(image)) => {
                        state.result_image = Some(Arc::new(image));
                        state.has_error = false;
                    },
                    Some(Err(err)) => {
                        warn!(kind = ?err.kind(), "background removal failed: {err}");
                        state.has_error = true;
                        state.error_message = Some(err.to_string());
                    },
                    None => {
                        warn!("background removal produced no result");
                        state.has_error = true;
                        state.error_message = Some("no result produced".to_string());
                    },
                }
                true
            });
        }));

        Ok(())
    }

    /// Abort the in-flight job, if any, and clear the loading flag
    pub fn cancel(&self) {
        if let Ok(mut job) = self.job.lock() {
            if let Some(handle) = job.take() {
                handle.abort();
            }
        }
        self.state.send_if_modified(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
    }
}

impl Drop for RemovalSession {
    fn drop(&mut self) {
        if let Ok(mut job) = self.job.lock() {
            if let Some(handle) = job.take() {
                handle.abort();
            }
        }
    }
}
