use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Distribution used when drawing integer values inside a `[min, max]` range.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    #[default]
    Uniform,
    Normal,
    PositiveHalfNormal,
    NegativeHalfNormal,
}

/// How surviving objects move from one timepoint to the next.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum MovementStrategy {
    /// Objects keep their position.
    Stationary,
    /// Every object moves along a random direction each step.
    Random,
    /// `percentage` % of objects head for their nearest target point each
    /// step; the others move randomly.
    TowardTargets { percentage: f64 },
}

/// Where new objects (and target points) are placed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum PlacementMode {
    /// Rejection sampling inside an elliptical cell outline.
    InsideCell,
    /// Gaussian scatter around random triangles of a supplied surface mesh.
    NearSurface { sigma: f64 },
}

/// Background and shot noise settings for rendering.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoiseParams {
    /// Percentage of all voxels that receive a shot-noise value.
    pub shot_percent: f64,
    pub shot_min: u32,
    pub shot_max: u32,
    pub shot_distribution: DistributionKind,
    pub background_min: u32,
    pub background_max: u32,
}

/// Probabilistic merging of nearby objects.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Chance (0-100) that a close pair merges.
    pub percentage: f64,
    /// Pairs closer than this (spacing-scaled grid units) are merge candidates.
    pub distance: f64,
}

/// Range validation failures, reported once before a run starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{name}: minimum {min} is greater than maximum {max}")]
    EmptyRange { name: &'static str, min: f64, max: f64 },
    #[error("{name} must be at least {min}, got {value}")]
    TooSmall { name: &'static str, min: f64, value: f64 },
    #[error("{name} must be at most {max}, got {value}")]
    TooLarge { name: &'static str, max: f64, value: f64 },
    #[error("{name} must be a finite, non-negative number, got {value}")]
    NotNonNegative { name: &'static str, value: f64 },
}

/// Flat, validated parameters used at runtime.
///
/// Derived from [`crate::SimulationConfig`]; immutable for the duration of
/// a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    // Grid & time
    pub dims: [u32; 3],
    pub timepoints: usize,
    pub time_difference: f64,
    pub voxel_size_um: [f64; 3],
    /// Voxel size normalised by the x voxel size (x spacing is always 1).
    pub spacing: [f64; 3],

    // Objects
    pub object_count_min: u32,
    pub object_count_max: u32,
    pub size_min: u32,
    pub size_max: u32,
    pub size_distribution: DistributionKind,
    /// Max change of size per step in percent; the sign selects growth or shrinkage.
    pub size_change: i32,
    pub intensity_min: u32,
    pub intensity_max: u32,
    pub intensity_change: i32,
    pub placement: PlacementMode,
    /// Cell centre for surface statistics (grid units).
    pub cell_center: [f64; 3],

    // Movement
    pub movement: MovementStrategy,
    pub target_points: u32,
    /// Extra target points must lie within this radius of the first one (0 = unconstrained).
    pub target_radius: f64,
    pub speed_min: u32,
    pub speed_max: u32,

    pub clustering: Option<ClusterParams>,
    pub noise: Option<NoiseParams>,

    // Caching
    pub cache_capacity: usize,
    pub create_all: bool,

    // External data
    pub object_source: Option<PathBuf>,
    pub surface_mesh: Option<PathBuf>,

    pub seed: Option<u64>,
}

impl ParameterSet {
    /// Ratio used to flatten movement along z (`Z / X`).
    pub fn z_aspect(&self) -> f64 {
        self.dims[2] as f64 / self.dims[0] as f64
    }

    /// Timestamp (seconds) of every timepoint.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.timepoints)
            .map(|t| t as f64 * self.time_difference)
            .collect()
    }

    /// Physical volume of one voxel in µm³.
    pub fn voxel_volume_um3(&self) -> f64 {
        self.voxel_size_um.iter().product()
    }

    /// Whether objects are placed near an external surface.
    pub fn needs_surface(&self) -> bool {
        matches!(self.placement, PlacementMode::NearSurface { .. })
    }

    /// Checks every configured range once. Later out-of-range values are clamped.
    pub fn validate(&self) -> Result<(), ParameterError> {
        for (name, d) in [("x", self.dims[0]), ("y", self.dims[1]), ("z", self.dims[2])] {
            at_least(name, d as f64, 1.0)?;
        }
        at_least("timepoints", self.timepoints as f64, 1.0)?;
        non_negative("time_difference", self.time_difference)?;
        for v in self.voxel_size_um {
            if !(v.is_finite() && v > 0.0) {
                return Err(ParameterError::TooSmall { name: "voxel_size_um", min: f64::MIN_POSITIVE, value: v });
            }
        }

        range("object count", self.object_count_min, self.object_count_max)?;
        range("object size", self.size_min, self.size_max)?;
        at_least("size_min", self.size_min as f64, 1.0)?;
        range("object intensity", self.intensity_min, self.intensity_max)?;
        at_most("intensity_max", self.intensity_max as f64, 255.0)?;
        range("speed", self.speed_min, self.speed_max)?;

        if let MovementStrategy::TowardTargets { percentage } = self.movement {
            percent("move_percentage", percentage)?;
            at_least("target_points", self.target_points as f64, 1.0)?;
        }
        non_negative("target_radius", self.target_radius)?;

        if let PlacementMode::NearSurface { sigma } = self.placement {
            non_negative("sigma_dist_surface", sigma)?;
        }

        if let Some(cluster) = &self.clustering {
            percent("cluster_percentage", cluster.percentage)?;
            non_negative("cluster_distance", cluster.distance)?;
        }

        if let Some(noise) = &self.noise {
            percent("shot_noise_amount", noise.shot_percent)?;
            range("shot noise", noise.shot_min, noise.shot_max)?;
            at_most("shot_noise_max", noise.shot_max as f64, 255.0)?;
            range("background noise", noise.background_min, noise.background_max)?;
            at_most("background_noise_max", noise.background_max as f64, 255.0)?;
        }
        Ok(())
    }
}

fn range(name: &'static str, min: u32, max: u32) -> Result<(), ParameterError> {
    if min > max {
        return Err(ParameterError::EmptyRange { name, min: min as f64, max: max as f64 });
    }
    Ok(())
}

fn at_least(name: &'static str, value: f64, min: f64) -> Result<(), ParameterError> {
    if value < min {
        return Err(ParameterError::TooSmall { name, min, value });
    }
    Ok(())
}

fn at_most(name: &'static str, value: f64, max: f64) -> Result<(), ParameterError> {
    if value > max {
        return Err(ParameterError::TooLarge { name, max, value });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ParameterError::NotNonNegative { name, value });
    }
    Ok(())
}

fn percent(name: &'static str, value: f64) -> Result<(), ParameterError> {
    non_negative(name, value)?;
    at_most(name, value, 100.0)
}
