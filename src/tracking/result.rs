//! Per-frame localization result returned to the client.

use std::path::PathBuf;

use serde::Serialize;

use crate::atlas::{FloorKey, SegmentId};
use crate::geometry::FloorPose;

/// Outcome of one localization frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseUpdate {
    /// Floorplan pose, `None` when the frame could not be localized.
    pub pose: Option<FloorPose>,
    pub building: Option<String>,
    pub floor: Option<String>,
    /// Segment the session is tracking after this frame.
    pub segment: Option<SegmentId>,
    /// The client should switch to a new floorplan.
    pub floorplan_changed: bool,
    /// Floorplan image of the new floor, set when `floorplan_changed`.
    pub floorplan: Option<PathBuf>,
}

impl PoseUpdate {
    pub fn floor_key(&self) -> Option<FloorKey> {
        match (&self.building, &self.floor) {
            (Some(b), Some(f)) => Some(FloorKey::new(b.clone(), f.clone())),
            _ => None,
        }
    }

    pub fn is_localized(&self) -> bool {
        self.pose.is_some()
    }
}
