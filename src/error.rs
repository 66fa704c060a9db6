//! Error types for generation and rendering.

use particle_common::ParameterError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParameterError),

    #[error("no position found inside the cell region after {attempts} attempts")]
    PlacementFailed { attempts: usize },

    #[error("object source '{path}' could not be used: {reason}")]
    ObjectSource { path: PathBuf, reason: String },

    #[error("object source is configured but no objects were supplied")]
    MissingObjectSource,

    #[error("surface mesh is invalid: {reason}")]
    InvalidSurface { reason: String },

    #[error("surface mesh '{path}' could not be read: {reason}")]
    SurfaceMesh { path: PathBuf, reason: String },

    #[error("placement near a surface was requested but no surface mesh was supplied")]
    MissingSurface,

    #[error("timepoint {timepoint} is out of range (0..{count})")]
    TimepointOutOfRange { timepoint: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, SimulationError>;
