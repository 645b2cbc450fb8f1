#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Calibrated camera model and camera arrays.
pub mod camera;

/// Error types for the capture volume.
pub mod error;

/// Readers and writers for calibration point data and board definitions.
pub mod io;

/// Bundle adjustment boundary and the built-in point refiner.
pub mod optimize;

/// Sparse 2D observations and 3D point estimates.
pub mod points;

/// Rigid transform helpers.
pub mod transforms;

/// Multi-view linear triangulation.
pub mod triangulation;

mod volume;
pub use volume::*;

pub use camera::{CameraArray, CameraData};
pub use error::VolumeError;
pub use points::{Observation, PointEstimates};
