use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// A simple 3D vector in grid (voxel) coordinates.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec3 { x: 0.0, y: 0.0, z: 0.0 }
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Vec3::new(a[0], a[1], a[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a normalized version of the vector (unit vector).
    /// Returns a zero vector if the original vector's length is zero.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-12 {
            let inv_len = 1.0 / len_sq.sqrt();
            self.scale(inv_len)
        } else {
            Vec3::zero()
        }
    }

    /// Calculates the dot product with another vector.
    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Calculates the squared distance to another point.
    pub fn distance_squared(&self, other: Vec3) -> f64 {
        (*self - other).length_squared()
    }

    /// Calculates the distance to another point.
    pub fn distance(&self, other: Vec3) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scales the vector by a scalar value.
    pub fn scale(&self, scalar: f64) -> Self {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    /// Component-wise product, used to convert grid units into physical units.
    pub fn mul_elem(&self, factors: [f64; 3]) -> Self {
        Vec3::new(self.x * factors[0], self.y * factors[1], self.z * factors[2])
    }

    /// Component-wise quotient, the inverse of [`Vec3::mul_elem`].
    pub fn div_elem(&self, factors: [f64; 3]) -> Self {
        Vec3::new(self.x / factors[0], self.y / factors[1], self.z / factors[2])
    }

    /// Distance measured with per-axis spacing applied to the difference.
    pub fn scaled_distance(&self, other: Vec3, spacing: [f64; 3]) -> f64 {
        (*self - other).mul_elem(spacing).length()
    }

    /// Clamps every coordinate into `[0, dims[i] - 1]`.
    pub fn clamp_to_grid(&self, dims: [u32; 3]) -> Self {
        Vec3::new(
            clamp(self.x, 0.0, dims[0].saturating_sub(1) as f64),
            clamp(self.y, 0.0, dims[1].saturating_sub(1) as f64),
            clamp(self.z, 0.0, dims[2].saturating_sub(1) as f64),
        )
    }

    /// Midpoint between two points.
    pub fn midpoint(&self, other: Vec3) -> Vec3 {
        (*self + other) / 2.0
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        self.scale(scalar)
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Vec3::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scaled_distance_applies_spacing() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 2.0);
        assert_relative_eq!(a.scaled_distance(b, [1.0, 1.0, 2.0]), 5.0);
    }

    #[test]
    fn clamp_to_grid_keeps_inside() {
        let p = Vec3::new(-3.0, 70.0, 4.5).clamp_to_grid([64, 64, 16]);
        assert_eq!(p, Vec3::new(0.0, 63.0, 4.5));
    }

    #[test]
    fn normalize_zero_vector() {
        assert_eq!(Vec3::zero().normalize_or_zero(), Vec3::zero());
        assert_relative_eq!(Vec3::new(0.0, 3.0, 4.0).normalize_or_zero().length(), 1.0);
    }
}
