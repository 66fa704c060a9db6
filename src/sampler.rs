//! Integer draws from the four supported distributions.
//!
//! Every draw is clamped into `[min, max]`; draws are never rejected.

use particle_common::DistributionKind;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Draws a value in `[min, max]` following `kind`.
///
/// Normal uses mean `(min+max)/2` and sigma `(max-mean)/3`. The half-normal
/// variants use a zero-mean normal with sigma `2σ`, folded onto `min`
/// (positive) or `max` (negative). Ranges with `min > max` are a
/// configuration error caught by [`particle_common::ParameterSet::validate`];
/// here they collapse to `min`.
pub fn sample<R: Rng>(rng: &mut R, kind: DistributionKind, min: i64, max: i64) -> i64 {
    if min >= max {
        return min;
    }
    let mean = (min + max) as f64 / 2.0;
    let sigma = (max as f64 - mean) / 3.0;

    let value = match kind {
        DistributionKind::Uniform => return rng.random_range(min..=max),
        DistributionKind::Normal => gauss(rng, mean, sigma).round(),
        DistributionKind::PositiveHalfNormal => (gauss(rng, 0.0, 2.0 * sigma).abs() + min as f64).round(),
        DistributionKind::NegativeHalfNormal => (max as f64 - gauss(rng, 0.0, 2.0 * sigma).abs()).round(),
    };
    (value as i64).clamp(min, max)
}

/// Unsigned convenience wrapper used for sizes and intensities.
pub fn sample_u32<R: Rng>(rng: &mut R, kind: DistributionKind, min: u32, max: u32) -> u32 {
    sample(rng, kind, min as i64, max as i64) as u32
}

fn gauss<R: Rng>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
    match Normal::new(mean, sigma) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}
