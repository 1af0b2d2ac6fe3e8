//! Per-frame person detection models.
//!
//! Detections are ephemeral: they exist for the duration of one frame and
//! are never persisted. There is no identity linking across frames.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in native pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box width in pixels.
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Box height in pixels.
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Centroid of the box (midpoint of both axes).
    ///
    /// Zone attribution is decided by this point alone.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Box area in square pixels.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// One detected person in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PersonDetection {
    /// Bounding box in native pixel coordinates.
    pub bbox: BoundingBox,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

impl PersonDetection {
    /// Create a new detection.
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    /// Centroid used for zone attribution.
    pub fn centroid(&self) -> (f32, f32) {
        self.bbox.center()
    }
}
