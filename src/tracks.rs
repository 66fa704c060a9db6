//! Per-object trajectories built from the clustered time series.

use particle_common::{ClusterMergeEvent, ObjectState, Track, TrackPoint};
use std::collections::BTreeMap;

/// Builds one track per id, ascending by id.
///
/// An absorbed object's track ends with one extra point: the merged
/// survivor at the merge timepoint, tagged with the survivor's id.
pub fn assemble_tracks(
    series: &[Vec<ObjectState>],
    merges: &[ClusterMergeEvent],
    time_difference: f64,
) -> Vec<Track> {
    let point = |t: usize, obj: &ObjectState, merged_into: Option<u32>| TrackPoint {
        timepoint: t,
        timestamp: t as f64 * time_difference,
        position: obj.position,
        size: obj.size,
        intensity: obj.intensity,
        merged_into,
    };

    let mut by_id: BTreeMap<u32, Vec<TrackPoint>> = BTreeMap::new();
    for (t, snapshot) in series.iter().enumerate() {
        for obj in snapshot {
            by_id.entry(obj.id).or_default().push(point(t, obj, None));
        }
    }
    for event in merges {
        by_id
            .entry(event.absorbed_id)
            .or_default()
            .push(point(event.timepoint, &event.survivor, Some(event.survivor.id)));
    }

    by_id
        .into_iter()
        .map(|(id, mut points)| {
            points.sort_by_key(|p| p.timepoint);
            Track { id, points }
        })
        .collect()
}
