//! Probabilistic merging of nearby objects across the finished time series.
//!
//! Timepoint 0 is never clustered. Each later timepoint is scanned once, in
//! order, so merges made at `t` already shape the positions seen at `t + 1`.

use crate::grid::SpatialGrid;
use crate::movement::ValueBounds;
use log::{debug, trace};
use particle_common::{ClusterMergeEvent, ClusterParams, ObjectState, Vec3};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Share of the combined size and intensity a merged object keeps.
const MERGE_RETENTION: f64 = 0.7;

pub struct ClusterMerger {
    cluster: ClusterParams,
    spacing: [f64; 3],
    dims: [u32; 3],
    bounds: ValueBounds,
}

// Carried onto every later snapshot of a survivor.
#[derive(Debug, Clone, Copy)]
struct SurvivorOverride {
    offset: Vec3,
    size: u32,
    intensity: u32,
}

impl ClusterMerger {
    pub fn new(cluster: ClusterParams, spacing: [f64; 3], dims: [u32; 3], bounds: ValueBounds) -> Self {
        ClusterMerger { cluster, spacing, dims, bounds }
    }

    /// Returns the clustered snapshots (sorted by id) and the merges made.
    ///
    /// A pair closer than the cluster distance merges with the configured
    /// probability. The larger object survives; on equal sizes the lower id
    /// does. Both objects of a merged pair sit out the rest of that timepoint.
    pub fn merge<R: Rng>(
        &self,
        series: Vec<Vec<ObjectState>>,
        rng: &mut R,
    ) -> (Vec<Vec<ObjectState>>, Vec<ClusterMergeEvent>) {
        let mut absorbed: BTreeSet<u32> = BTreeSet::new();
        let mut overrides: BTreeMap<u32, SurvivorOverride> = BTreeMap::new();
        let mut events = Vec::new();
        let mut result = Vec::with_capacity(series.len());

        for (t, objects) in series.into_iter().enumerate() {
            let mut snapshot: Vec<ObjectState> = objects
                .into_iter()
                .filter(|o| !absorbed.contains(&o.id))
                .map(|o| self.apply_override(o, overrides.get(&o.id)))
                .collect();
            snapshot.sort_by_key(|o| o.id);

            if t > 0 {
                let merged_before = events.len();
                self.merge_timepoint(t, &mut snapshot, &mut absorbed, &mut overrides, &mut events, rng);
                if events.len() > merged_before {
                    debug!("Timepoint {}: {} merges, {} objects remain", t, events.len() - merged_before, snapshot.len());
                }
            }
            result.push(snapshot);
        }
        (result, events)
    }

    fn apply_override(&self, obj: ObjectState, over: Option<&SurvivorOverride>) -> ObjectState {
        match over {
            Some(over) => ObjectState {
                id: obj.id,
                position: (obj.position + over.offset).clamp_to_grid(self.dims),
                size: over.size,
                intensity: over.intensity,
            },
            None => obj,
        }
    }

    fn merge_timepoint<R: Rng>(
        &self,
        t: usize,
        snapshot: &mut Vec<ObjectState>,
        absorbed: &mut BTreeSet<u32>,
        overrides: &mut BTreeMap<u32, SurvivorOverride>,
        events: &mut Vec<ClusterMergeEvent>,
        rng: &mut R,
    ) {
        let scaled: Vec<Vec3> = snapshot.iter().map(|o| o.position.mul_elem(self.spacing)).collect();
        let grid = SpatialGrid::build(scaled, self.cluster.distance);
        let mut taken = vec![false; snapshot.len()];
        let mut removed = BTreeSet::new();

        for i in 0..snapshot.len() {
            for j in grid.neighbors_within(i, self.cluster.distance) {
                if taken[i] {
                    break;
                }
                if j <= i || taken[j] {
                    continue;
                }
                if rng.random::<f64>() * 100.0 >= self.cluster.percentage {
                    continue;
                }

                let (a, b) = (snapshot[i], snapshot[j]);
                // Snapshot is sorted by id, so `a` wins ties.
                let (survivor_idx, loser) = if a.size >= b.size { (i, b) } else { (j, a) };
                let survivor = snapshot[survivor_idx];
                let merged = ObjectState {
                    id: survivor.id,
                    position: a.position.midpoint(b.position),
                    size: self.bounds.clamp_size(combine(a.size, b.size)),
                    intensity: self.bounds.clamp_intensity(combine(a.intensity, b.intensity)),
                };
                trace!(
                    "Timepoint {}: object {} absorbs {} ({} + {} -> {} voxels)",
                    t, survivor.id, loser.id, a.size, b.size, merged.size
                );

                let entry = overrides.entry(survivor.id).or_insert(SurvivorOverride {
                    offset: Vec3::zero(),
                    size: merged.size,
                    intensity: merged.intensity,
                });
                entry.offset += merged.position - survivor.position;
                entry.size = merged.size;
                entry.intensity = merged.intensity;

                snapshot[survivor_idx] = merged;
                taken[i] = true;
                taken[j] = true;
                absorbed.insert(loser.id);
                removed.insert(loser.id);
                events.push(ClusterMergeEvent { timepoint: t, absorbed_id: loser.id, survivor: merged });
            }
        }
        snapshot.retain(|o| !removed.contains(&o.id));
    }
}

fn combine(a: u32, b: u32) -> i64 {
    (MERGE_RETENTION * (a as f64 + b as f64)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn merger(percentage: f64, distance: f64) -> ClusterMerger {
        ClusterMerger::new(
            ClusterParams { percentage, distance },
            [1.0, 1.0, 1.0],
            [64, 64, 16],
            ValueBounds { size: (1, 100), intensity: (0, 255) },
        )
    }

    fn stationary(objects: Vec<ObjectState>, timepoints: usize) -> Vec<Vec<ObjectState>> {
        vec![objects; timepoints]
    }

    #[test]
    fn close_pair_merges_once() {
        let objects = vec![
            ObjectState::new(1, Vec3::new(10.0, 10.0, 5.0), 10, 200),
            ObjectState::new(2, Vec3::new(12.0, 10.0, 5.0), 8, 100),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (series, events) = merger(100.0, 5.0).merge(stationary(objects, 3), &mut rng);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timepoint, 1);
        assert_eq!(events[0].absorbed_id, 2);
        assert_eq!(series[0].len(), 2);
        for snapshot in &series[1..] {
            assert_eq!(snapshot.len(), 1);
            let survivor = snapshot[0];
            assert_eq!(survivor.id, 1);
            assert_eq!(survivor.position, Vec3::new(11.0, 10.0, 5.0));
            assert_eq!(survivor.size, 13);
            assert_eq!(survivor.intensity, 210);
        }
    }

    #[test]
    fn equal_sizes_keep_lower_id() {
        let objects = vec![
            ObjectState::new(4, Vec3::new(30.0, 30.0, 5.0), 10, 200),
            ObjectState::new(3, Vec3::new(31.0, 30.0, 5.0), 10, 200),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (series, events) = merger(100.0, 5.0).merge(stationary(objects, 2), &mut rng);
        assert_eq!(events[0].absorbed_id, 4);
        assert_eq!(series[1][0].id, 3);
    }

    #[test]
    fn zero_percent_never_merges() {
        let objects = vec![
            ObjectState::new(1, Vec3::new(10.0, 10.0, 5.0), 10, 200),
            ObjectState::new(2, Vec3::new(10.0, 11.0, 5.0), 10, 200),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (series, events) = merger(0.0, 5.0).merge(stationary(objects, 4), &mut rng);
        assert!(events.is_empty());
        assert!(series.iter().all(|s| s.len() == 2));
    }

    #[test]
    fn distant_objects_stay_apart() {
        let objects = vec![
            ObjectState::new(1, Vec3::new(10.0, 10.0, 5.0), 10, 200),
            ObjectState::new(2, Vec3::new(40.0, 10.0, 5.0), 10, 200),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (_, events) = merger(100.0, 5.0).merge(stationary(objects, 3), &mut rng);
        assert!(events.is_empty());
    }

    #[test]
    fn merged_pair_sits_out_the_timepoint() {
        // Three objects in a row; only one merge is possible at t=1.
        let objects = vec![
            ObjectState::new(1, Vec3::new(10.0, 10.0, 5.0), 10, 200),
            ObjectState::new(2, Vec3::new(11.0, 10.0, 5.0), 10, 200),
            ObjectState::new(3, Vec3::new(12.0, 10.0, 5.0), 10, 200),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (series, events) = merger(100.0, 5.0).merge(stationary(objects, 2), &mut rng);
        assert_eq!(events.len(), 1);
        assert_eq!(series[1].len(), 2);
    }

    #[test]
    fn sub_voxel_distance_on_a_full_size_grid() {
        let merger = ClusterMerger::new(
            ClusterParams { percentage: 100.0, distance: 0.05 },
            [1.0, 1.0, 1.0],
            [512, 512, 25],
            ValueBounds { size: (1, 100), intensity: (0, 255) },
        );
        let objects = vec![
            ObjectState::new(1, Vec3::new(10.0, 10.0, 5.0), 10, 200),
            ObjectState::new(2, Vec3::new(500.0, 500.0, 24.0), 10, 200),
            ObjectState::new(3, Vec3::new(500.0, 500.02, 24.0), 8, 200),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let (series, events) = merger.merge(stationary(objects, 2), &mut rng);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].absorbed_id, 3);
        assert_eq!(series[1].iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    proptest! {
        #[test]
        fn survivors_plus_merges_equal_previous_ids(
            seed in any::<u64>(),
            coords in proptest::collection::vec((0.0f64..63.0, 0.0f64..63.0, 0.0f64..15.0), 2..25),
        ) {
            let objects: Vec<ObjectState> = coords
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z))| ObjectState::new(i as u32 + 1, Vec3::new(x, y, z), 10 + i as u32, 200))
                .collect();
            let mut rng = StdRng::seed_from_u64(seed);
            let (series, events) = merger(50.0, 12.0).merge(stationary(objects, 5), &mut rng);
            for t in 1..series.len() {
                let merges = events.iter().filter(|e| e.timepoint == t).count();
                prop_assert_eq!(series[t].len() + merges, series[t - 1].len());
                let prev: BTreeSet<u32> = series[t - 1].iter().map(|o| o.id).collect();
                prop_assert!(series[t].iter().all(|o| prev.contains(&o.id)));
            }
        }
    }
}
