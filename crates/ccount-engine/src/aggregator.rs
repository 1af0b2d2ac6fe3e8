//! Per-frame zone attribution and cross-frame peak tracking.

use std::path::PathBuf;

use chrono::Utc;
use ccount_models::{PersonDetection, RunResult, ZoneOccupancy};

use crate::geometry::ScaledZone;

/// Occupancy state for one run.
///
/// Zones are held in the caller-supplied order, which is the canonical
/// order for attribution and for the final result. Frame counts are
/// recomputed from scratch every frame; only the running maximum survives
/// across frames. There is no identity tracking, so the same person is
/// recounted on every frame they appear in.
#[derive(Debug)]
pub struct OccupancyAggregator {
    zones: Vec<ZoneState>,
}

#[derive(Debug)]
struct ZoneState {
    id: i64,
    label: String,
    frame_count: u32,
    peak_count: u32,
}

impl OccupancyAggregator {
    /// Create aggregation state over the scaled zones of a run.
    pub fn new(zones: &[ScaledZone]) -> Self {
        Self {
            zones: zones
                .iter()
                .map(|z| ZoneState {
                    id: z.id,
                    label: z.label.clone(),
                    frame_count: 0,
                    peak_count: 0,
                })
                .collect(),
        }
    }

    /// Attribute one frame's detections and fold the counts into the peaks.
    ///
    /// Each detection goes to the first zone in canonical order containing
    /// its bounding-box centroid, and to that zone only, even when zones
    /// overlap. Returns, per detection, the index of the attributed zone
    /// (into the canonical zone slice) or `None`.
    pub fn observe_frame(
        &mut self,
        detections: &[PersonDetection],
        zones: &[ScaledZone],
    ) -> Vec<Option<usize>> {
        for state in &mut self.zones {
            state.frame_count = 0;
        }

        let attributions = detections
            .iter()
            .map(|detection| {
                let centroid = detection.centroid();
                let hit = zones.iter().position(|zone| zone.contains(centroid));
                if let Some(index) = hit {
                    self.zones[index].frame_count += 1;
                }
                hit
            })
            .collect();

        for state in &mut self.zones {
            state.peak_count = state.peak_count.max(state.frame_count);
        }

        attributions
    }

    /// Current per-zone counts for this frame, in canonical order.
    pub fn frame_counts(&self) -> Vec<u32> {
        self.zones.iter().map(|z| z.frame_count).collect()
    }

    /// Running per-zone peaks, in canonical order.
    pub fn peak_counts(&self) -> Vec<u32> {
        self.zones.iter().map(|z| z.peak_count).collect()
    }

    /// Zone labels in canonical order.
    pub fn labels(&self) -> impl Iterator<Item = (i64, &str)> {
        self.zones.iter().map(|z| (z.id, z.label.as_str()))
    }

    /// Produce the final result: total = sum of peaks, zones in canonical
    /// order.
    pub fn finalize(&self, output_video: Option<PathBuf>) -> RunResult {
        let zone_counts: Vec<ZoneOccupancy> = self
            .zones
            .iter()
            .map(|z| ZoneOccupancy {
                zone_id: z.id,
                zone_label: z.label.clone(),
                count: z.peak_count,
            })
            .collect();

        RunResult {
            total_count: zone_counts.iter().map(|z| z.count).sum(),
            zone_counts,
            output_video,
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccount_models::{BoundingBox, Point};

    fn zone(id: i64, origin_x: f32) -> ScaledZone {
        ScaledZone {
            id,
            label: format!("zone-{id}"),
            polygon: vec![
                Point::new(origin_x, 0.0),
                Point::new(origin_x + 100.0, 0.0),
                Point::new(origin_x + 100.0, 100.0),
                Point::new(origin_x, 100.0),
            ],
        }
    }

    fn person_at(cx: f32, cy: f32) -> PersonDetection {
        PersonDetection::new(BoundingBox::new(cx - 5.0, cy - 5.0, cx + 5.0, cy + 5.0), 0.9)
    }

    #[test]
    fn test_counts_reset_every_frame() {
        let zones = vec![zone(1, 0.0)];
        let mut agg = OccupancyAggregator::new(&zones);

        agg.observe_frame(&[person_at(50.0, 50.0), person_at(20.0, 20.0)], &zones);
        assert_eq!(agg.frame_counts(), vec![2]);

        agg.observe_frame(&[], &zones);
        assert_eq!(agg.frame_counts(), vec![0]);
        // Peak survives the empty frame.
        assert_eq!(agg.peak_counts(), vec![2]);
    }

    #[test]
    fn test_peak_is_monotonic_max_over_frames() {
        let zones = vec![zone(1, 0.0)];
        let mut agg = OccupancyAggregator::new(&zones);

        let frame_sizes = [1usize, 3, 2, 0, 3, 1];
        let mut running_max = 0u32;
        for &n in &frame_sizes {
            let detections: Vec<_> = (0..n).map(|i| person_at(10.0 + i as f32, 10.0)).collect();
            agg.observe_frame(&detections, &zones);
            running_max = running_max.max(n as u32);
            assert_eq!(agg.peak_counts(), vec![running_max]);
        }
    }

    #[test]
    fn test_overlapping_zones_first_match_only() {
        // Two identical zones: the detection must land in the first one.
        let zones = vec![zone(1, 0.0), zone(2, 0.0)];
        let mut agg = OccupancyAggregator::new(&zones);

        let attributions = agg.observe_frame(&[person_at(50.0, 50.0)], &zones);
        assert_eq!(attributions, vec![Some(0)]);
        assert_eq!(agg.frame_counts(), vec![1, 0]);
    }

    #[test]
    fn test_detection_outside_all_zones() {
        let zones = vec![zone(1, 0.0)];
        let mut agg = OccupancyAggregator::new(&zones);

        let attributions = agg.observe_frame(&[person_at(500.0, 500.0)], &zones);
        assert_eq!(attributions, vec![None]);
        assert_eq!(agg.frame_counts(), vec![0]);
    }

    #[test]
    fn test_total_is_sum_of_peaks() {
        let zones = vec![zone(1, 0.0), zone(2, 200.0)];
        let mut agg = OccupancyAggregator::new(&zones);

        // Frame 1: two in zone 1, one in zone 2.
        agg.observe_frame(
            &[
                person_at(10.0, 10.0),
                person_at(90.0, 90.0),
                person_at(250.0, 50.0),
            ],
            &zones,
        );
        // Frame 2: zone 2 peaks at two, zone 1 drops.
        agg.observe_frame(&[person_at(250.0, 50.0), person_at(210.0, 10.0)], &zones);

        let result = agg.finalize(None);
        assert_eq!(result.zone_counts[0].count, 2);
        assert_eq!(result.zone_counts[1].count, 2);
        assert_eq!(result.total_count, 4);
    }

    #[test]
    fn test_result_preserves_canonical_order() {
        let zones = vec![zone(9, 0.0), zone(1, 200.0), zone(4, 400.0)];
        let agg = OccupancyAggregator::new(&zones);
        let result = agg.finalize(None);
        let ids: Vec<i64> = result.zone_counts.iter().map(|z| z.zone_id).collect();
        assert_eq!(ids, vec![9, 1, 4]);
    }
}
