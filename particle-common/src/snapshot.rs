use serde::{Serialize, Deserialize};
use crate::vecmath::Vec3;

/// State of one simulated object at one timepoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Stable identity, assigned densely from 1 at the first timepoint.
    pub id: u32,
    /// Nominal position in grid units (pre-render).
    pub position: Vec3,
    /// Target voxel count.
    pub size: u32,
    pub intensity: u32,
}

impl ObjectState {
    pub fn new(id: u32, position: Vec3, size: u32, intensity: u32) -> Self {
        ObjectState { id, position, size, intensity }
    }
}

/// Records that `absorbed_id` was folded into `survivor` at `timepoint`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterMergeEvent {
    pub timepoint: usize,
    pub absorbed_id: u32,
    /// The combined object as it exists at `timepoint`.
    pub survivor: ObjectState,
}

/// One entry of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub timepoint: usize,
    /// Seconds since the first timepoint.
    pub timestamp: f64,
    pub position: Vec3,
    pub size: u32,
    pub intensity: u32,
    /// Set on the final point of a track whose object was absorbed by a merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<u32>,
}

/// Ordered per-timepoint states of one logical object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u32,
    pub points: Vec<TrackPoint>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_timepoint(&self) -> Option<usize> {
        self.points.last().map(|p| p.timepoint)
    }
}
