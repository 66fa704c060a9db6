//! Rasterises one timepoint's objects into a [`Volume`].
//!
//! Each object is drawn as a sphere whose volume approximates its requested
//! voxel count. When the spherical core comes out too small the object is
//! grown by random 6-connected voxels, with a bounded number of attempts.

use crate::sampler::sample_u32;
use crate::volume::Volume;
use log::{debug, trace};
use particle_common::{NoiseParams, ObjectState, Vec3};
use rand::Rng;
use std::collections::HashSet;

/// `r = (RADIUS_FACTOR * size)^(1/3)`.
const RADIUS_FACTOR: f64 = 0.235_619_449_019_234_48;

/// Random voxel picks allowed while growing an under-filled object.
pub const GROWTH_ATTEMPTS: usize = 100;

/// Voxel intensities vary by this fraction around the object intensity.
const INTENSITY_JITTER: f64 = 0.05;

const FACE_NEIGHBORS: [[i64; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// What was actually drawn for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedObject {
    pub id: u32,
    pub requested_size: u32,
    pub intensity: u32,
    /// Position the object was placed at before rendering.
    pub nominal_position: Vec3,
    /// Intensity-weighted centroid of the drawn voxels. Authoritative for statistics.
    pub center_of_mass: Vec3,
    pub voxels: Vec<[usize; 3]>,
    /// Intensity written to each entry of `voxels`.
    pub intensities: Vec<u8>,
}

impl RenderedObject {
    pub fn realized_size(&self) -> usize {
        self.voxels.len()
    }
}

#[derive(Debug, Clone)]
pub struct RenderedTimepoint {
    pub timepoint: usize,
    pub volume: Volume,
    /// Ascending by id.
    pub objects: Vec<RenderedObject>,
}

pub struct VolumeRenderer {
    dims: [usize; 3],
    noise: Option<NoiseParams>,
}

impl VolumeRenderer {
    pub fn new(dims: [u32; 3], noise: Option<NoiseParams>) -> Self {
        VolumeRenderer { dims: dims.map(|d| d as usize), noise }
    }

    pub fn render<R: Rng>(&self, timepoint: usize, objects: &[ObjectState], rng: &mut R) -> RenderedTimepoint {
        let mut volume = Volume::zeros(self.dims);
        if let Some(noise) = &self.noise {
            add_background_noise(&mut volume, noise, rng);
            add_shot_noise(&mut volume, noise, rng);
        }

        let mut sorted = objects.to_vec();
        sorted.sort_by_key(|o| o.id);
        let rendered: Vec<RenderedObject> = sorted.iter().map(|obj| draw_object(&mut volume, obj, rng)).collect();

        let underfilled = rendered
            .iter()
            .filter(|o| o.realized_size() != o.requested_size as usize)
            .count();
        debug!(
            "Rendered timepoint {}: {} objects ({} differ from requested size), {} non-zero voxels",
            timepoint,
            rendered.len(),
            underfilled,
            volume.count_nonzero()
        );
        RenderedTimepoint { timepoint, volume, objects: rendered }
    }
}

fn add_background_noise<R: Rng>(volume: &mut Volume, noise: &NoiseParams, rng: &mut R) {
    let lo = noise.background_min.min(255) as u8;
    let hi = noise.background_max.min(255) as u8;
    for voxel in volume.as_mut_slice() {
        *voxel = rng.random_range(lo..=hi);
    }
}

// The same voxel may be hit more than once, so fewer distinct voxels can change.
fn add_shot_noise<R: Rng>(volume: &mut Volume, noise: &NoiseParams, rng: &mut R) {
    if noise.shot_percent <= 0.0 || volume.is_empty() {
        return;
    }
    let count = (noise.shot_percent / 100.0 * volume.len() as f64).ceil() as usize;
    let voxels = volume.as_mut_slice();
    for _ in 0..count {
        let index = rng.random_range(0..voxels.len());
        let value = sample_u32(rng, noise.shot_distribution, noise.shot_min, noise.shot_max);
        voxels[index] = value.min(255) as u8;
    }
    trace!("Added {} shot noise voxels", count);
}

// Inclusive voxel span of one axis, shifted back inside [0, max] when it
// sticks out. Returns the span and the (possibly re-centred) centre.
fn axis_span(center: f64, radius: f64, max: i64) -> (i64, i64, f64) {
    let mut lo = (center - radius).ceil() as i64;
    let mut hi = (center + radius).floor() as i64;
    let mut center = center;
    if lo < 0 {
        hi -= lo;
        lo = 0;
        center = (lo + hi) as f64 / 2.0;
    }
    if hi > max {
        lo -= hi - max;
        hi = max;
        center = (lo + hi) as f64 / 2.0;
    }
    (lo.max(0), hi, center)
}

fn draw_object<R: Rng>(volume: &mut Volume, obj: &ObjectState, rng: &mut R) -> RenderedObject {
    let radius = (obj.size as f64 * RADIUS_FACTOR).cbrt();
    let dims = volume.dims();
    let (mut xs, mut xe, cx) = axis_span(obj.position.x, radius, dims[0] as i64 - 1);
    let (mut ys, mut ye, cy) = axis_span(obj.position.y, radius, dims[1] as i64 - 1);
    let (mut zs, mut ze, cz) = axis_span(obj.position.z, radius, dims[2] as i64 - 1);

    // Keep only the core when the box alone already exceeds the target size.
    if (xe - xs) * (ye - ys) * (ze - zs) > obj.size as i64 {
        xs += 1;
        xe -= 1;
        ys += 1;
        ye -= 1;
        zs += 1;
        ze -= 1;
    }

    let lo = ((1.0 - INTENSITY_JITTER) * obj.intensity as f64).round().clamp(0.0, 255.0) as u8;
    let hi = ((1.0 + INTENSITY_JITTER) * obj.intensity as f64).round().clamp(0.0, 255.0) as u8;
    let mut fill = ObjectFill::new(lo, hi.max(lo));

    for z in zs..=ze {
        for y in ys..=ye {
            for x in xs..=xe {
                let d = ((cx - x as f64).powi(2) + (cy - y as f64).powi(2) + (cz - z as f64).powi(2)).sqrt();
                if d <= radius && volume.contains(x, y, z) {
                    fill.paint(volume, [x, y, z], rng);
                }
            }
        }
    }

    if fill.is_empty() {
        let nearest = Vec3::new(cx, cy, cz).clamp_to_grid(dims.map(|d| d as u32));
        fill.paint(volume, [nearest.x.round() as i64, nearest.y.round() as i64, nearest.z.round() as i64], rng);
    }

    let requested = obj.size as usize;
    let mut attempts = 0;
    while fill.len() < requested && attempts < GROWTH_ATTEMPTS {
        attempts += 1;
        let candidate = [
            rng.random_range(xs - 1..=(xe + 1).max(xs - 1)),
            rng.random_range(ys - 1..=(ye + 1).max(ys - 1)),
            rng.random_range(zs - 1..=(ze + 1).max(zs - 1)),
        ];
        let [x, y, z] = candidate;
        if volume.contains(x, y, z) && !fill.filled(candidate) && fill.touches(candidate) {
            fill.paint(volume, candidate, rng);
        }
    }

    if fill.len() != requested {
        trace!(
            "Object {} drew {} of {} requested voxels after {} growth attempts",
            obj.id,
            fill.len(),
            requested,
            attempts
        );
    }

    let center_of_mass = fill.center_of_mass().unwrap_or(obj.position);
    RenderedObject {
        id: obj.id,
        requested_size: obj.size,
        intensity: obj.intensity,
        nominal_position: obj.position,
        center_of_mass,
        voxels: fill.voxels.iter().map(|v| v.map(|c| c as usize)).collect(),
        intensities: fill.intensities,
    }
}

// Voxels drawn for one object so far.
struct ObjectFill {
    lo: u8,
    hi: u8,
    voxels: Vec<[i64; 3]>,
    intensities: Vec<u8>,
    occupied: HashSet<[i64; 3]>,
}

impl ObjectFill {
    fn new(lo: u8, hi: u8) -> Self {
        ObjectFill { lo, hi, voxels: Vec::new(), intensities: Vec::new(), occupied: HashSet::new() }
    }

    fn len(&self) -> usize {
        self.voxels.len()
    }

    fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    fn filled(&self, voxel: [i64; 3]) -> bool {
        self.occupied.contains(&voxel)
    }

    fn touches(&self, [x, y, z]: [i64; 3]) -> bool {
        FACE_NEIGHBORS
            .iter()
            .any(|[dx, dy, dz]| self.occupied.contains(&[x + dx, y + dy, z + dz]))
    }

    // Caller guarantees `voxel` is inside the volume.
    fn paint<R: Rng>(&mut self, volume: &mut Volume, voxel: [i64; 3], rng: &mut R) {
        let value = rng.random_range(self.lo..=self.hi);
        let [x, y, z] = voxel;
        volume.set(x as usize, y as usize, z as usize, value);
        self.voxels.push(voxel);
        self.intensities.push(value);
        self.occupied.insert(voxel);
    }

    fn center_of_mass(&self) -> Option<Vec3> {
        if self.voxels.is_empty() {
            return None;
        }
        let total: f64 = self.intensities.iter().map(|&i| i as f64).sum();
        let (weights, total) = if total > 0.0 {
            (self.intensities.iter().map(|&i| i as f64).collect::<Vec<_>>(), total)
        } else {
            (vec![1.0; self.voxels.len()], self.voxels.len() as f64)
        };
        let sum = self
            .voxels
            .iter()
            .zip(&weights)
            .fold(Vec3::zero(), |acc, (&[x, y, z], &w)| acc + Vec3::new(x as f64, y as f64, z as f64) * w);
        Some(sum / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use particle_common::DistributionKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noise() -> NoiseParams {
        NoiseParams {
            shot_percent: 1.0,
            shot_min: 128,
            shot_max: 255,
            shot_distribution: DistributionKind::Uniform,
            background_min: 1,
            background_max: 30,
        }
    }

    #[test]
    fn small_object_reaches_requested_size() {
        let renderer = VolumeRenderer::new([32, 32, 16], None);
        let mut rng = StdRng::seed_from_u64(42);
        let obj = ObjectState::new(1, Vec3::new(16.0, 16.0, 8.0), 10, 200);
        let rendered = renderer.render(0, &[obj], &mut rng);
        let drawn = &rendered.objects[0];
        assert!(drawn.realized_size() <= 10 && drawn.realized_size() >= 8);
        assert_eq!(rendered.volume.count_nonzero(), drawn.realized_size());
        for &v in &drawn.intensities {
            assert!((190..=210).contains(&v));
        }
    }

    #[test]
    fn center_of_mass_stays_near_nominal_position() {
        let renderer = VolumeRenderer::new([40, 40, 40], None);
        let mut rng = StdRng::seed_from_u64(3);
        let obj = ObjectState::new(1, Vec3::new(20.0, 20.0, 20.0), 200, 100);
        let drawn = &renderer.render(0, &[obj], &mut rng).objects[0];
        assert!(drawn.center_of_mass.distance(obj.position) < 1.0);
    }

    #[test]
    fn objects_at_the_border_stay_inside() {
        let renderer = VolumeRenderer::new([16, 16, 4], None);
        let mut rng = StdRng::seed_from_u64(8);
        let obj = ObjectState::new(1, Vec3::new(0.0, 15.0, 0.0), 40, 255);
        let drawn = &renderer.render(0, &[obj], &mut rng).objects[0];
        assert!(drawn.realized_size() > 0);
        for &[x, y, z] in &drawn.voxels {
            assert!(x < 16 && y < 16 && z < 4);
        }
    }

    #[test]
    fn empty_core_is_seeded() {
        let renderer = VolumeRenderer::new([8, 8, 8], None);
        let mut rng = StdRng::seed_from_u64(1);
        let obj = ObjectState::new(1, Vec3::new(3.5, 3.5, 3.5), 1, 50);
        let drawn = &renderer.render(0, &[obj], &mut rng).objects[0];
        assert_eq!(drawn.realized_size(), 1);
    }

    #[test]
    fn objects_are_drawn_in_id_order() {
        let renderer = VolumeRenderer::new([32, 32, 8], None);
        let mut rng = StdRng::seed_from_u64(1);
        let a = ObjectState::new(2, Vec3::new(5.0, 5.0, 4.0), 5, 100);
        let b = ObjectState::new(1, Vec3::new(20.0, 20.0, 4.0), 5, 100);
        let rendered = renderer.render(0, &[a, b], &mut rng);
        let ids: Vec<u32> = rendered.objects.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn background_noise_fills_every_voxel() {
        let renderer = VolumeRenderer::new([16, 16, 4], Some(noise()));
        let mut rng = StdRng::seed_from_u64(5);
        let rendered = renderer.render(0, &[], &mut rng);
        assert_eq!(rendered.volume.count_nonzero(), 16 * 16 * 4);
        let shot = rendered.volume.as_slice().iter().filter(|&&v| v >= 128).count();
        assert!(shot >= 1 && shot <= 11);
    }

    #[test]
    fn span_is_recentred_at_the_border() {
        let (lo, hi, c) = axis_span(0.0, 2.0, 31);
        assert_eq!((lo, hi), (0, 4));
        assert_relative_eq!(c, 2.0);
        let (lo, hi, _) = axis_span(31.0, 2.0, 31);
        assert_eq!((lo, hi), (27, 31));
    }
}
