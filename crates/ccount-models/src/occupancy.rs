//! Occupancy results and run progress models.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key under which a run publishes its progress.
///
/// Pollers must reuse the key the run was started with. Keys derive from
/// the video reference so a poller that knows the video can find the run;
/// a failed run is restarted under a fresh identity via [`RunKey::unique`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunKey(pub String);

impl RunKey {
    /// Derive the key for a run over the given video reference.
    pub fn for_video(path: impl AsRef<Path>) -> Self {
        Self(format!("video_{}", path.as_ref().display()))
    }

    /// Mint a fresh, unique run identity.
    pub fn unique() -> Self {
        Self(format!("run_{}", Uuid::new_v4()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Progress of an in-flight run, overwritten once per processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressRecord {
    /// Frames processed so far.
    pub current: u64,
    /// Total frames expected in the run.
    pub total: u64,
    /// Completion percentage, floor(current / total * 100), clamped to 100.
    pub percentage: u8,
}

impl ProgressRecord {
    /// Build a record for `current` of `total` frames.
    pub fn new(current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current * 100) / total).min(100) as u8
        };
        Self {
            current,
            total,
            percentage,
        }
    }

    /// The zero-valued record returned before a run has started.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Peak occupancy observed for one zone over a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ZoneOccupancy {
    pub zone_id: i64,
    pub zone_label: String,
    /// Maximum simultaneous person count attributed to the zone.
    pub count: u32,
}

/// Final result of a completed run.
///
/// Produced exactly once, on successful completion; a failed run never
/// yields a partial result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunResult {
    /// Sum of per-zone peak counts.
    pub total_count: u32,
    /// Per-zone peaks, in the caller-supplied zone order.
    pub zone_counts: Vec<ZoneOccupancy>,
    /// Annotated output video, when the run mode produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_video: Option<PathBuf>,
    /// Completion timestamp.
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage_floors() {
        assert_eq!(ProgressRecord::new(1, 3).percentage, 33);
        assert_eq!(ProgressRecord::new(2, 3).percentage, 66);
        assert_eq!(ProgressRecord::new(3, 3).percentage, 100);
    }

    #[test]
    fn test_progress_zero_total() {
        assert_eq!(ProgressRecord::new(5, 0).percentage, 0);
    }

    #[test]
    fn test_progress_clamps_overrun() {
        // Frame estimates can undershoot the real frame count.
        assert_eq!(ProgressRecord::new(12, 10).percentage, 100);
    }

    #[test]
    fn test_run_key_for_video() {
        let key = RunKey::for_video("/data/uploads/mall.mp4");
        assert_eq!(key.as_str(), "video_/data/uploads/mall.mp4");
    }

    #[test]
    fn test_unique_keys_differ() {
        assert_ne!(RunKey::unique(), RunKey::unique());
    }
}
