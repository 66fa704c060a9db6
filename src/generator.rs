//! Initial object population at timepoint 0.

use crate::error::{Result, SimulationError};
use crate::placement::{Placement, MAX_PLACEMENT_ATTEMPTS};
use crate::sampler::sample_u32;
use crate::source::SourceObject;
use log::{debug, info, trace};
use particle_common::{MovementStrategy, ObjectState, ParameterSet, Vec3};
use rand::Rng;

pub struct ObjectGenerator<'a> {
    params: &'a ParameterSet,
    placement: Placement<'a>,
}

impl<'a> ObjectGenerator<'a> {
    pub fn new(params: &'a ParameterSet, placement: Placement<'a>) -> Self {
        ObjectGenerator { params, placement }
    }

    /// Points objects move toward. Empty unless the movement strategy uses them.
    ///
    /// With a non-zero target radius every point after the first is redrawn
    /// until it lies within that radius of the first one.
    pub fn target_points<R: Rng>(&self, rng: &mut R) -> Result<Vec<Vec3>> {
        if !matches!(self.params.movement, MovementStrategy::TowardTargets { .. }) {
            return Ok(Vec::new());
        }
        let radius = self.params.target_radius;
        let z_spacing = self.params.spacing[2];
        let mut points: Vec<Vec3> = Vec::with_capacity(self.params.target_points as usize);
        for _ in 0..self.params.target_points {
            let mut point = self.placement.sample_point(rng)?;
            let anchor = points.first().copied().filter(|_| radius > 0.0);
            if let Some(first) = anchor {
                let within = |p: Vec3| p.scaled_distance(first, [1.0, 1.0, z_spacing]) <= radius;
                let mut attempts = 0;
                while !within(point) {
                    attempts += 1;
                    if attempts >= MAX_PLACEMENT_ATTEMPTS {
                        return Err(SimulationError::PlacementFailed { attempts });
                    }
                    point = self.placement.sample_point(rng)?;
                }
            }
            debug!("Target point {} at {:?}", points.len() + 1, point);
            points.push(point);
        }
        Ok(points)
    }

    /// Objects for timepoint 0, ids 1..=count.
    ///
    /// With an external source the count and sizes come from the source;
    /// otherwise the count is uniform in the configured range and sizes
    /// follow the configured distribution. Intensity is always uniform in
    /// the configured intensity range.
    pub fn initial_objects<R: Rng>(
        &self,
        source: Option<&[SourceObject]>,
        rng: &mut R,
    ) -> Result<Vec<ObjectState>> {
        let p = self.params;
        let count = match source {
            Some(objects) => objects.len() as u32,
            None => rng.random_range(p.object_count_min..=p.object_count_max),
        };
        info!("Creating {} objects for the first timepoint", count);

        let mut objects = Vec::with_capacity(count as usize);
        for id in 1..=count {
            let size = match source {
                Some(objects) => objects[(id - 1) as usize].size,
                None => sample_u32(rng, p.size_distribution, p.size_min, p.size_max),
            };
            let position = self.placement.sample_point(rng)?;
            let intensity = rng.random_range(p.intensity_min..=p.intensity_max);
            trace!("Object {} at {:?}, size {}, intensity {}", id, position, size, intensity);
            objects.push(ObjectState::new(id, position, size, intensity));
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::CellRegion;
    use particle_common::SimulationConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> ParameterSet {
        let mut config = SimulationConfig::default();
        config.dimensions.x = 64;
        config.dimensions.y = 64;
        config.dimensions.z = 16;
        config.objects.number_of_objects_start = 4;
        config.objects.number_of_objects_end = 9;
        config.parameter_set()
    }

    #[test]
    fn ids_are_dense_from_one() {
        let params = params();
        let mut rng = StdRng::seed_from_u64(3);
        let region = CellRegion::random(params.dims, &mut rng);
        let generator = ObjectGenerator::new(&params, Placement::InsideCell(&region));
        let objects = generator.initial_objects(None, &mut rng).unwrap();
        assert!((4..=9).contains(&objects.len()));
        for (i, obj) in objects.iter().enumerate() {
            assert_eq!(obj.id, i as u32 + 1);
            assert!((params.size_min..=params.size_max).contains(&obj.size));
            assert!((params.intensity_min..=params.intensity_max).contains(&obj.intensity));
            assert!(region.contains(obj.position));
        }
    }

    #[test]
    fn source_determines_count_and_size() {
        let params = params();
        let mut rng = StdRng::seed_from_u64(3);
        let region = CellRegion::random(params.dims, &mut rng);
        let generator = ObjectGenerator::new(&params, Placement::InsideCell(&region));
        let source = vec![
            SourceObject { size: 77, intensity: 10.0 },
            SourceObject { size: 3, intensity: 20.0 },
        ];
        let objects = generator.initial_objects(Some(&source), &mut rng).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].size, 77);
        assert_eq!(objects[1].size, 3);
    }

    #[test]
    fn targets_respect_radius() {
        let mut params = params();
        params.target_points = 4;
        params.target_radius = 10.0;
        let mut rng = StdRng::seed_from_u64(8);
        let region = CellRegion::random(params.dims, &mut rng);
        let generator = ObjectGenerator::new(&params, Placement::InsideCell(&region));
        let targets = generator.target_points(&mut rng).unwrap();
        assert_eq!(targets.len(), 4);
        for t in &targets[1..] {
            assert!(t.distance(targets[0]) <= 10.0);
        }
    }

    #[test]
    fn no_targets_without_target_movement() {
        let mut params = params();
        params.movement = MovementStrategy::Random;
        let mut rng = StdRng::seed_from_u64(8);
        let region = CellRegion::random(params.dims, &mut rng);
        let generator = ObjectGenerator::new(&params, Placement::InsideCell(&region));
        assert!(generator.target_points(&mut rng).unwrap().is_empty());
    }
}
