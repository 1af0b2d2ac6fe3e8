//! Zone-based crowd occupancy analysis engine.
//!
//! The engine decodes a video frame by frame, detects persons with a
//! YOLOv8 ONNX model, attributes each detection to a user-defined polygon
//! zone by its bounding-box centroid, tracks per-zone peak occupancy, and
//! renders annotated output. One [`pipeline::AnalysisPipeline`] serves
//! three consumption modes over the same frame loop: batch, incremental
//! events, and a continuous image stream.

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod progress;
pub mod renderer;
pub mod sink;
pub mod source;

pub use config::EngineConfig;
pub use detector::{DetectorConfig, PersonDetector, YoloPersonDetector};
pub use error::{EngineError, EngineResult};
pub use pipeline::{AnalysisPipeline, AnalysisRequest, RunState};
pub use progress::ProgressTracker;
