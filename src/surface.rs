//! Triangulated cell surface supplied from outside the engine.
//!
//! Vertices are stored in physical (spacing-scaled) units. Used read-only by
//! near-surface placement and by the surface statistics.

use crate::error::{Result, SimulationError};
use particle_common::Vec3;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[usize; 3]>,
    spacing: [f64; 3],
}

#[derive(Deserialize)]
struct MeshFile {
    vertices: Vec<[f64; 3]>,
    triangles: Vec<[usize; 3]>,
    #[serde(default = "unit_spacing")]
    spacing: [f64; 3],
}

fn unit_spacing() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

// Slightly skewed so rays do not run along mesh edges of axis-aligned meshes.
const RAY_DIRECTION: Vec3 = Vec3 { x: 1.0, y: 0.000_123_7, z: 0.000_317_3 };
const RAY_EPSILON: f64 = 1e-9;

impl SurfaceMesh {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[usize; 3]>, spacing: [f64; 3]) -> Result<Self> {
        if triangles.is_empty() {
            return Err(SimulationError::InvalidSurface { reason: "mesh has no triangles".into() });
        }
        if let Some(bad) = triangles.iter().flatten().find(|&&i| i >= vertices.len()) {
            return Err(SimulationError::InvalidSurface {
                reason: format!("triangle references vertex {} but only {} exist", bad, vertices.len()),
            });
        }
        if spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SimulationError::InvalidSurface { reason: format!("invalid spacing {spacing:?}") });
        }
        Ok(SurfaceMesh { vertices, triangles, spacing })
    }

    /// Loads `{ "vertices": [[x,y,z]..], "triangles": [[a,b,c]..], "spacing": [..] }`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |reason: String| SimulationError::SurfaceMesh { path: path.to_path_buf(), reason };
        let text = std::fs::read_to_string(path).map_err(|e| io_err(e.to_string()))?;
        let file: MeshFile = serde_json::from_str(&text).map_err(|e| io_err(e.to_string()))?;
        let vertices = file.vertices.into_iter().map(Vec3::from_array).collect();
        Self::new(vertices, file.triangles, file.spacing)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Centroid of triangle `index` in grid units.
    pub fn triangle_centroid(&self, index: usize) -> Vec3 {
        let [a, b, c] = self.triangles[index];
        let sum = self.vertices[a] + self.vertices[b] + self.vertices[c];
        (sum / 3.0).div_elem(self.spacing)
    }

    /// Centroid of a uniformly chosen triangle, in grid units.
    pub fn random_centroid<R: Rng>(&self, rng: &mut R) -> Vec3 {
        let index = rng.random_range(0..self.triangles.len());
        self.triangle_centroid(index)
    }

    /// Ray-casting parity test. `point` is in physical units.
    pub fn contains(&self, point: Vec3) -> bool {
        let crossings = self
            .triangles
            .iter()
            .filter(|&&[a, b, c]| {
                ray_hits_triangle(point, RAY_DIRECTION, self.vertices[a], self.vertices[b], self.vertices[c])
            })
            .count();
        crossings % 2 == 1
    }

    /// Closest mesh vertex to `point`, both in physical units.
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        self.vertices
            .iter()
            .copied()
            .min_by(|a, b| {
                a.distance_squared(point)
                    .partial_cmp(&b.distance_squared(point))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(point)
    }

    /// Converts a grid-unit position into the mesh's physical units.
    pub fn to_physical(&self, grid: Vec3) -> Vec3 {
        grid.mul_elem(self.spacing)
    }
}

// Möller–Trumbore; only intersections in front of the origin count.
fn ray_hits_triangle(origin: Vec3, dir: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> bool {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < RAY_EPSILON {
        return false;
    }
    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    e2.dot(q) * inv_det > RAY_EPSILON
}
