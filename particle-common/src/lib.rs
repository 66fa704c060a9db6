pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, CachingConfig, DimensionsConfig, NoiseConfig, ObjectsConfig, MovementConfig, ClusteringConfig, OutputConfig};
pub use sim_params::{ParameterSet, ParameterError, DistributionKind, MovementStrategy, PlacementMode, NoiseParams, ClusterParams};
pub use snapshot::{ObjectState, ClusterMergeEvent, TrackPoint, Track};
pub use vecmath::{Vec3, clamp};
