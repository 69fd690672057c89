//! Frontend-facing services: file I/O and progress reporting

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
