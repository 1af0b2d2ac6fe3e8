//! Streaming event schema for incremental-event mode.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::occupancy::RunResult;

/// Per-zone counts carried by a frame event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ZoneSnapshot {
    pub zone_id: i64,
    pub zone_label: String,
    /// Persons attributed to the zone in this frame.
    pub count: u32,
    /// Running peak across all frames so far.
    pub peak: u32,
}

/// One structured update on the incremental-event stream.
///
/// A run emits one `Frame` per processed frame and closes the stream with
/// either `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Snapshot of zone counts after one frame.
    Frame {
        frame_number: u64,
        total_frames: u64,
        zones: Vec<ZoneSnapshot>,
    },

    /// Terminal event of a successful run.
    Completed { result: RunResult },

    /// Terminal event of a failed run.
    Failed { message: String },
}

impl AnalysisEvent {
    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
