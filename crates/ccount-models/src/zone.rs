//! Monitoring zone models.
//!
//! Zones are drawn by the user on a fixed 640x360 reference canvas and
//! scaled to the native video resolution at the start of each run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the reference canvas zones are authored in.
pub const CANVAS_WIDTH: f32 = 640.0;

/// Height of the reference canvas zones are authored in.
pub const CANVAS_HEIGHT: f32 = 360.0;

/// A point in canvas or pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Errors raised by zone validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ZoneError {
    #[error("zone {id} has {got} vertices, a polygon needs at least 3")]
    TooFewVertices { id: i64, got: usize },
}

/// A user-defined polygonal monitoring zone.
///
/// The polygon is an ordered vertex list in canvas space; the last vertex
/// implicitly connects back to the first. Zones are immutable for the
/// duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Zone {
    /// Zone identifier, owned by the zone-metadata collaborator.
    pub id: i64,
    /// Display label drawn on the output video.
    pub label: String,
    /// Ordered polygon vertices in 640x360 canvas space.
    pub polygon: Vec<Point>,
}

impl Zone {
    /// Create a new zone.
    pub fn new(id: i64, label: impl Into<String>, polygon: Vec<Point>) -> Self {
        Self {
            id,
            label: label.into(),
            polygon,
        }
    }

    /// Check that the polygon has enough vertices to enclose an area.
    pub fn validate(&self) -> Result<(), ZoneError> {
        if self.polygon.len() < 3 {
            return Err(ZoneError::TooFewVertices {
                id: self.id,
                got: self.polygon.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: i64) -> Zone {
        Zone::new(
            id,
            "entrance",
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
        )
    }

    #[test]
    fn test_valid_zone() {
        assert!(square(1).validate().is_ok());
    }

    #[test]
    fn test_degenerate_zone_rejected() {
        let zone = Zone::new(7, "line", vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert_eq!(
            zone.validate(),
            Err(ZoneError::TooFewVertices { id: 7, got: 2 })
        );
    }

    #[test]
    fn test_zone_serde_round_trip() {
        let zone = square(3);
        let json = serde_json::to_string(&zone).unwrap();
        let back: Zone = serde_json::from_str(&json).unwrap();
        assert_eq!(zone, back);
    }
}
