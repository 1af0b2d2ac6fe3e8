//! Error types for analysis runs.
//!
//! Every variant is fatal to the run that raised it; nothing is retried
//! internally. The orchestrator surfaces exactly one classification per
//! run, so IO and child-process failures are classified where they occur
//! instead of being funneled through a catch-all conversion.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during an analysis run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad run inputs: no zones, degenerate polygon, zero-sized target.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Video source unreadable or unsupported.
    #[error("input error: {0}")]
    Input(String),

    /// Detector initialization failed; no frame was processed.
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),

    /// Mid-run decode or detection failure.
    #[error("frame processing error: {0}")]
    FrameProcessing(String),

    /// Output sink could not be created or written.
    #[error("resource error: {0}")]
    Resource(String),

    /// Consumer disconnected; the run stopped before completion.
    #[error("run cancelled by consumer")]
    Cancelled,
}

impl EngineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create a model-unavailable error.
    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable(message.into())
    }

    /// Create a frame processing error.
    pub fn frame_processing(message: impl Into<String>) -> Self {
        Self::FrameProcessing(message.into())
    }

    /// Create a resource error.
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Whether the run ended because the consumer went away rather than
    /// because something broke.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
