//! Synthetic 4-D ground-truth generation: object populations that move,
//! merge and are rendered into 8-bit volumes with known tracks.

pub mod cache;
pub mod cluster;
pub mod error;
pub mod generator;
pub mod grid;
pub mod movement;
pub mod placement;
pub mod render;
pub mod sampler;
pub mod simulation;
pub mod source;
pub mod stats;
pub mod surface;
pub mod tracks;
pub mod volume;

pub use cache::{EvictionPolicy, LowestTimepoint, VolumeCache};
pub use error::{Result, SimulationError};
pub use render::{RenderedObject, RenderedTimepoint, VolumeRenderer};
pub use simulation::{ExternalInputs, ParticleSimulation, TimeSeries};
pub use stats::{ObjectStatistics, SurfaceStatistics};
pub use volume::Volume;
