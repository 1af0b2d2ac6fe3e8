//! Zone geometry: canvas-to-native scaling and point-in-polygon tests.

use ccount_models::{Point, Zone, CANVAS_HEIGHT, CANVAS_WIDTH};

use crate::error::{EngineError, EngineResult};

/// A zone whose polygon has been mapped into native pixel space.
///
/// Derived once per run; canvas corner (0,0) maps to native (0,0) and
/// canvas corner (640,360) maps to native (width,height) exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledZone {
    pub id: i64,
    pub label: String,
    pub polygon: Vec<Point>,
}

impl ScaledZone {
    /// Whether the given native-space point lies inside the zone polygon.
    pub fn contains(&self, point: (f32, f32)) -> bool {
        point_in_polygon(point, &self.polygon)
    }
}

/// Scale one zone from canvas space to native pixel space.
pub fn scale_zone(zone: &Zone, frame_width: u32, frame_height: u32) -> EngineResult<ScaledZone> {
    if frame_width == 0 || frame_height == 0 {
        return Err(EngineError::configuration(format!(
            "cannot scale zones to {}x{} target",
            frame_width, frame_height
        )));
    }
    zone.validate()
        .map_err(|e| EngineError::configuration(e.to_string()))?;

    let polygon = zone
        .polygon
        .iter()
        .map(|p| Point {
            x: p.x / CANVAS_WIDTH * frame_width as f32,
            y: p.y / CANVAS_HEIGHT * frame_height as f32,
        })
        .collect();

    Ok(ScaledZone {
        id: zone.id,
        label: zone.label.clone(),
        polygon,
    })
}

/// Scale all zones, preserving the caller-supplied (canonical) order.
pub fn scale_zones(
    zones: &[Zone],
    frame_width: u32,
    frame_height: u32,
) -> EngineResult<Vec<ScaledZone>> {
    zones
        .iter()
        .map(|z| scale_zone(z, frame_width, frame_height))
        .collect()
}

/// Even-odd ray-casting containment test.
///
/// The polygon is treated as a closed loop (last vertex connects to the
/// first). Edges whose endpoints share a y coordinate are skipped rather
/// than counted as crossings. On-edge points get whichever side the f32
/// comparisons land on; the answer is deterministic for a given input.
pub fn point_in_polygon(point: (f32, f32), polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = point;
    let mut inside = false;

    let mut p1 = polygon[0];
    for i in 1..=polygon.len() {
        let p2 = polygon[i % polygon.len()];
        if p1.y != p2.y
            && y > p1.y.min(p2.y)
            && y <= p1.y.max(p2.y)
            && x <= p1.x.max(p2.x)
        {
            let x_intersect = (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
            if p1.x == p2.x || x <= x_intersect {
                inside = !inside;
            }
        }
        p1 = p2;
    }

    inside
}
