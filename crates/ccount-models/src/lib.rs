//! Shared data models for the CrowdCount backend.
//!
//! This crate provides Serde-serializable types for:
//! - Monitoring zones authored in canvas space
//! - Per-frame person detections
//! - Occupancy results and progress records
//! - Streaming event schemas for incremental analysis

pub mod detection;
pub mod event;
pub mod occupancy;
pub mod zone;

// Re-export common types
pub use detection::{BoundingBox, PersonDetection};
pub use event::{AnalysisEvent, ZoneSnapshot};
pub use occupancy::{ProgressRecord, RunKey, RunResult, ZoneOccupancy};
pub use zone::{Point, Zone, ZoneError, CANVAS_HEIGHT, CANVAS_WIDTH};
