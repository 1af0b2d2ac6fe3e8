//! Overlay rendering onto decoded frames.
//!
//! Draw order is fixed: zone outlines and labels first (static, under
//! everything), then detection boxes with a "Person" label, then a
//! centroid marker for every detection attributed to a zone this frame.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::warn;

use ccount_models::PersonDetection;

use crate::geometry::ScaledZone;

const ZONE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PERSON_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_RADIUS: i32 = 5;

/// Draws zone and detection overlays onto frames.
pub struct OverlayRenderer {
    font: Option<FontArc>,
}

impl OverlayRenderer {
    /// Create a renderer with an optional label font.
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// Load the label font from `path`, degrading to geometry-only
    /// overlays when it is missing.
    pub fn from_font_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!(font = %path.display(), "unusable label font, labels disabled: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(font = %path.display(), "label font not found, labels disabled: {e}");
                None
            }
        };
        Self::new(font)
    }

    /// Render one frame's overlays in the fixed draw order.
    ///
    /// `attributions[i]` is the zone index detection `i` was attributed
    /// to, if any; attributed detections get a centroid marker.
    pub fn render(
        &self,
        frame: &mut RgbImage,
        zones: &[ScaledZone],
        detections: &[PersonDetection],
        attributions: &[Option<usize>],
    ) {
        for zone in zones {
            self.draw_zone(frame, zone);
        }

        for detection in detections {
            self.draw_detection(frame, detection);
        }

        for (detection, attribution) in detections.iter().zip(attributions) {
            if attribution.is_some() {
                let (cx, cy) = detection.centroid();
                draw_filled_circle_mut(
                    frame,
                    (cx.round() as i32, cy.round() as i32),
                    MARKER_RADIUS,
                    MARKER_COLOR,
                );
            }
        }
    }

    fn draw_zone(&self, frame: &mut RgbImage, zone: &ScaledZone) {
        let n = zone.polygon.len();
        for i in 0..n {
            let a = zone.polygon[i];
            let b = zone.polygon[(i + 1) % n];
            draw_thick_line(frame, (a.x, a.y), (b.x, b.y), ZONE_COLOR);
        }

        if let (Some(font), Some(anchor)) = (&self.font, zone.polygon.first()) {
            draw_text_mut(
                frame,
                ZONE_COLOR,
                anchor.x.round() as i32,
                anchor.y.round() as i32,
                PxScale::from(24.0),
                font,
                &zone.label,
            );
        }
    }

    fn draw_detection(&self, frame: &mut RgbImage, detection: &PersonDetection) {
        let bbox = detection.bbox;
        let w = bbox.width().round() as i32;
        let h = bbox.height().round() as i32;
        if w > 0 && h > 0 {
            draw_hollow_rect_mut(
                frame,
                Rect::at(bbox.x1.round() as i32, bbox.y1.round() as i32)
                    .of_size(w as u32, h as u32),
                PERSON_COLOR,
            );
        }

        if let Some(font) = &self.font {
            draw_text_mut(
                frame,
                PERSON_COLOR,
                bbox.x1.round() as i32,
                (bbox.y1.round() as i32 - 14).max(0),
                PxScale::from(14.0),
                font,
                "Person",
            );
        }
    }
}

/// Roughly 3px line, matching the original zone outline weight.
fn draw_thick_line(frame: &mut RgbImage, a: (f32, f32), b: (f32, f32), color: Rgb<u8>) {
    for (dx, dy) in [(0.0f32, 0.0f32), (0.0, 1.0), (0.0, -1.0), (1.0, 0.0), (-1.0, 0.0)] {
        draw_line_segment_mut(frame, (a.0 + dx, a.1 + dy), (b.0 + dx, b.1 + dy), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccount_models::{BoundingBox, Point};

    fn zone() -> ScaledZone {
        ScaledZone {
            id: 1,
            label: "entrance".to_string(),
            polygon: vec![
                Point::new(10.0, 10.0),
                Point::new(50.0, 10.0),
                Point::new(50.0, 50.0),
                Point::new(10.0, 50.0),
            ],
        }
    }

    #[test]
    fn test_zone_outline_is_drawn() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(100, 100);
        renderer.render(&mut frame, &[zone()], &[], &[]);
        assert_eq!(*frame.get_pixel(30, 10), ZONE_COLOR);
        assert_eq!(*frame.get_pixel(50, 30), ZONE_COLOR);
    }

    #[test]
    fn test_attributed_detection_gets_marker() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(100, 100);
        let detection = PersonDetection::new(BoundingBox::new(20.0, 20.0, 40.0, 40.0), 0.9);

        renderer.render(&mut frame, &[zone()], &[detection], &[Some(0)]);
        // Centroid (30,30) carries the marker, drawn over everything else.
        assert_eq!(*frame.get_pixel(30, 30), MARKER_COLOR);
        // Box outline present.
        assert_eq!(*frame.get_pixel(20, 30), PERSON_COLOR);
    }

    #[test]
    fn test_unattributed_detection_has_no_marker() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(100, 100);
        let detection = PersonDetection::new(BoundingBox::new(60.0, 60.0, 80.0, 80.0), 0.9);

        renderer.render(&mut frame, &[zone()], &[detection], &[None]);
        assert_ne!(*frame.get_pixel(70, 70), MARKER_COLOR);
    }

    #[test]
    fn test_missing_font_degrades_gracefully() {
        let renderer = OverlayRenderer::from_font_path("/nonexistent/font.ttf");
        let mut frame = RgbImage::new(100, 100);
        renderer.render(&mut frame, &[zone()], &[], &[]);
        assert_eq!(*frame.get_pixel(30, 10), ZONE_COLOR);
    }

    #[test]
    fn test_unparseable_font_degrades_gracefully() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a truetype font").unwrap();

        let renderer = OverlayRenderer::from_font_path(file.path());
        let mut frame = RgbImage::new(100, 100);
        renderer.render(&mut frame, &[zone()], &[], &[]);
        assert_eq!(*frame.get_pixel(30, 10), ZONE_COLOR);
    }

    #[test]
    fn test_out_of_bounds_geometry_is_clipped() {
        let renderer = OverlayRenderer::new(None);
        let mut frame = RgbImage::new(32, 32);
        let detection = PersonDetection::new(BoundingBox::new(-10.0, -10.0, 64.0, 64.0), 0.9);
        // Must not panic.
        renderer.render(&mut frame, &[zone()], &[detection], &[Some(0)]);
    }
}
