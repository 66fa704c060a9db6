use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::{
    ClusterParams, DistributionKind, MovementStrategy, NoiseParams, ParameterSet, PlacementMode,
};
use std::path::{Path, PathBuf};

// Configuration for volume caching
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct CachingConfig {
    pub cache: bool,
    pub cache_amount: usize,
    pub create_all: bool,
}

impl Default for CachingConfig {
    fn default() -> Self {
        CachingConfig { cache: true, cache_amount: 15, create_all: true }
    }
}

// Grid size and timing
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct DimensionsConfig {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub time: usize,
    pub time_difference: f64,
    /// Physical voxel size in micrometres (x, y, z).
    pub voxel_size_um: [f64; 3],
}

impl Default for DimensionsConfig {
    fn default() -> Self {
        DimensionsConfig {
            x: 512,
            y: 512,
            z: 25,
            time: 15,
            time_difference: 300.0,
            voxel_size_um: [1.0, 1.0, 1.0],
        }
    }
}

// Background and shot noise
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct NoiseConfig {
    pub create_noise: bool,
    pub shot_noise_amount: f64,
    pub shot_noise_min: u32,
    pub shot_noise_max: u32,
    pub shot_noise_distribution: DistributionKind,
    pub background_noise_min: u32,
    pub background_noise_max: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            create_noise: false,
            shot_noise_amount: 0.1,
            shot_noise_min: 128,
            shot_noise_max: 255,
            shot_noise_distribution: DistributionKind::Uniform,
            background_noise_min: 1,
            background_noise_max: 30,
        }
    }
}

// Object population at the first timepoint and per-step fluctuation
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ObjectsConfig {
    /// Optional table of object sizes; determines the object count when set.
    pub read_objects: Option<PathBuf>,
    pub number_of_objects_start: u32,
    pub number_of_objects_end: u32,
    pub obj_size_start: u32,
    pub obj_size_end: u32,
    pub obj_size_distribution: DistributionKind,
    pub size_change: i32,
    pub obj_min_int: u32,
    pub obj_max_int: u32,
    pub int_change: i32,
    pub objects_create_source: bool,
    pub surface_mesh: Option<PathBuf>,
    pub sigma_dist_surface: f64,
    /// Cell centre used by surface statistics; grid centre when absent.
    pub cell_center: Option<[f64; 3]>,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        ObjectsConfig {
            read_objects: None,
            number_of_objects_start: 20,
            number_of_objects_end: 200,
            obj_size_start: 5,
            obj_size_end: 50,
            obj_size_distribution: DistributionKind::Uniform,
            size_change: 5,
            obj_min_int: 200,
            obj_max_int: 255,
            int_change: 5,
            objects_create_source: false,
            surface_mesh: None,
            sigma_dist_surface: 5.0,
            cell_center: None,
        }
    }
}

// Movement strategy
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct MovementConfig {
    pub random_movement: bool,
    pub move_towards_point: bool,
    pub target_points: u32,
    pub target_points_inside: f64,
    pub move_percentage: f64,
    pub speed_start: u32,
    pub speed_end: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        MovementConfig {
            random_movement: false,
            move_towards_point: true,
            target_points: 1,
            target_points_inside: 0.0,
            move_percentage: 30.0,
            speed_start: 2,
            speed_end: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ClusteringConfig {
    pub clustering: bool,
    pub cluster_percentage: f64,
    pub cluster_distance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig { clustering: true, cluster_percentage: 20.0, cluster_distance: 30.0 }
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_statistics: bool,
    #[serde(default = "default_true")]
    pub save_tracks: bool,
    #[serde(default)]
    pub save_volumes: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            save_statistics: true,
            save_tracks: true,
            save_volumes: false,
        }
    }
}

fn default_base_filename() -> String {
    "particle_simulation".to_string()
}

fn default_true() -> bool {
    true
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible runs; a random one is drawn when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub dimensions: DimensionsConfig,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub objects: ObjectsConfig,
    #[serde(default)]
    pub movement: MovementConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)?;
        config.parameter_set().validate()?;
        Ok(config)
    }

    /// Converts the configuration into the flat parameters used at runtime.
    pub fn parameter_set(&self) -> ParameterSet {
        let dims = [self.dimensions.x, self.dimensions.y, self.dimensions.z];
        let voxel = self.dimensions.voxel_size_um;
        // Spacing relative to x, so distances are measured in x-voxel units.
        let spacing = if voxel[0] > 0.0 {
            [1.0, voxel[1] / voxel[0], voxel[2] / voxel[0]]
        } else {
            [1.0, 1.0, 1.0]
        };

        let movement = if self.movement.move_towards_point {
            MovementStrategy::TowardTargets { percentage: self.movement.move_percentage }
        } else if self.movement.random_movement {
            MovementStrategy::Random
        } else {
            MovementStrategy::Stationary
        };

        let placement = if self.objects.objects_create_source {
            PlacementMode::NearSurface { sigma: self.objects.sigma_dist_surface }
        } else {
            PlacementMode::InsideCell
        };

        let clustering = self.clustering.clustering.then(|| ClusterParams {
            percentage: self.clustering.cluster_percentage,
            distance: self.clustering.cluster_distance,
        });

        let noise = self.noise.create_noise.then(|| NoiseParams {
            shot_percent: self.noise.shot_noise_amount,
            shot_min: self.noise.shot_noise_min,
            shot_max: self.noise.shot_noise_max,
            shot_distribution: self.noise.shot_noise_distribution,
            background_min: self.noise.background_noise_min,
            background_max: self.noise.background_noise_max,
        });

        let cell_center = self.objects.cell_center.unwrap_or([
            (dims[0] / 2) as f64,
            (dims[1] / 2) as f64,
            (dims[2] / 2) as f64,
        ]);

        ParameterSet {
            dims,
            timepoints: self.dimensions.time,
            time_difference: self.dimensions.time_difference,
            voxel_size_um: voxel,
            spacing,
            object_count_min: self.objects.number_of_objects_start,
            object_count_max: self.objects.number_of_objects_end,
            size_min: self.objects.obj_size_start,
            size_max: self.objects.obj_size_end,
            size_distribution: self.objects.obj_size_distribution,
            size_change: self.objects.size_change,
            intensity_min: self.objects.obj_min_int,
            intensity_max: self.objects.obj_max_int,
            intensity_change: self.objects.int_change,
            placement,
            cell_center,
            movement,
            target_points: self.movement.target_points,
            target_radius: self.movement.target_points_inside,
            speed_min: self.movement.speed_start,
            speed_max: self.movement.speed_end,
            clustering,
            noise,
            cache_capacity: if self.caching.cache { self.caching.cache_amount } else { 0 },
            create_all: self.caching.create_all,
            object_source: self.objects.read_objects.clone(),
            surface_mesh: self.objects.surface_mesh.clone(),
            seed: self.seed,
        }
    }
}
