//! Advances surviving objects from one timepoint to the next.

use particle_common::{MovementStrategy, ObjectState, ParameterSet, Vec3};
use rand::Rng;

/// Inclusive bounds that sizes and intensities are clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBounds {
    pub size: (u32, u32),
    pub intensity: (u32, u32),
}

impl ValueBounds {
    pub fn from_params(params: &ParameterSet) -> Self {
        ValueBounds {
            size: (params.size_min, params.size_max),
            intensity: (params.intensity_min, params.intensity_max),
        }
    }

    /// Widens the size bounds to cover externally supplied sizes.
    pub fn including_sizes(mut self, sizes: impl IntoIterator<Item = u32>) -> Self {
        for s in sizes {
            self.size.0 = self.size.0.min(s);
            self.size.1 = self.size.1.max(s);
        }
        self
    }

    pub fn clamp_size(&self, size: i64) -> u32 {
        size.clamp(self.size.0 as i64, self.size.1 as i64) as u32
    }

    pub fn clamp_intensity(&self, intensity: i64) -> u32 {
        intensity.clamp(self.intensity.0 as i64, self.intensity.1 as i64) as u32
    }
}

pub struct MovementEngine<'a> {
    params: &'a ParameterSet,
    targets: &'a [Vec3],
    bounds: ValueBounds,
}

impl<'a> MovementEngine<'a> {
    pub fn new(params: &'a ParameterSet, targets: &'a [Vec3], bounds: ValueBounds) -> Self {
        MovementEngine { params, targets, bounds }
    }

    /// Produces the object list of the next timepoint from `previous`.
    pub fn advance<R: Rng>(&self, previous: &[ObjectState], rng: &mut R) -> Vec<ObjectState> {
        previous.iter().map(|obj| self.advance_object(obj, rng)).collect()
    }

    fn advance_object<R: Rng>(&self, obj: &ObjectState, rng: &mut R) -> ObjectState {
        let p = self.params;
        let position = match self.direction(obj.position, rng) {
            Some(direction) => {
                let speed = rng.random_range(p.speed_min..=p.speed_max) as f64;
                (obj.position + direction * speed).clamp_to_grid(p.dims)
            }
            None => obj.position,
        };

        let size = self.bounds.clamp_size(obj.size as i64 + perturbation(rng, obj.size, p.size_change));
        let intensity = self
            .bounds
            .clamp_intensity(obj.intensity as i64 + perturbation(rng, obj.intensity, p.intensity_change));

        ObjectState { id: obj.id, position, size, intensity }
    }

    // Unit-speed displacement for one step, or None when the object stays put.
    fn direction<R: Rng>(&self, pos: Vec3, rng: &mut R) -> Option<Vec3> {
        let aspect = self.params.z_aspect();
        match self.params.movement {
            MovementStrategy::Stationary => None,
            MovementStrategy::Random => Some(random_direction(rng, aspect)),
            MovementStrategy::TowardTargets { percentage } => {
                if rng.random::<f64>() < percentage / 100.0 {
                    let target = self.nearest_target(pos)?;
                    let mut dir = (target - pos).normalize_or_zero();
                    dir.z *= aspect;
                    Some(dir)
                } else {
                    Some(random_direction(rng, aspect))
                }
            }
        }
    }

    fn nearest_target(&self, pos: Vec3) -> Option<Vec3> {
        let spacing = self.params.spacing;
        self.targets.iter().copied().min_by(|a, b| {
            a.scaled_distance(pos, spacing)
                .partial_cmp(&b.scaled_distance(pos, spacing))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

// z is flattened before normalising so movement stays proportional to the grid.
fn random_direction<R: Rng>(rng: &mut R, aspect: f64) -> Vec3 {
    let mut component = || {
        let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        sign * rng.random::<f64>()
    };
    let x = component();
    let y = component();
    let z = component() * aspect;
    Vec3::new(x, y, z).normalize_or_zero()
}

/// Signed change of at most `round(value * percent / 100)`, sign of `percent`.
fn perturbation<R: Rng>(rng: &mut R, value: u32, percent: i32) -> i64 {
    if percent == 0 {
        return 0;
    }
    let max_change = (value as f64 * percent as f64 / 100.0).round() as i64;
    let magnitude = rng.random_range(0..=max_change.abs());
    magnitude * max_change.signum()
}
