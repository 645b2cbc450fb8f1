use std::path::PathBuf;

use mocap_volume::triangulation::TriangulationError;

/// An error type for the post processing pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PostError {
    /// The tracker name is not part of the registry.
    #[error("Unknown tracker {name}, expected one of: {valid}")]
    UnknownTracker {
        /// The requested name.
        name: String,
        /// Comma separated list of valid names.
        valid: String,
    },

    /// The recording directory does not exist.
    #[error("Recording directory {} does not exist", .0.display())]
    MissingRecording(PathBuf),

    /// No camera of the array has raw data in the recording.
    #[error("No raw camera data found in {}", .0.display())]
    NoRawData(PathBuf),

    /// `create_xyz` ran before `create_xy`.
    #[error("2D keypoints not found at {}, run create_xy first", .0.display())]
    MissingXy(PathBuf),

    /// The sync indices span a timeline that cannot be represented.
    #[error("Sync indices {first}..={last} in {} span too long a timeline", .path.display())]
    SyncSpan {
        /// The 2D keypoint file.
        path: PathBuf,
        /// Smallest sync index.
        first: i64,
        /// Largest sync index.
        last: i64,
    },

    /// Not a single point could be triangulated.
    #[error("No 3D point could be triangulated for {}", .0.display())]
    NoTriangulatedPoints(PathBuf),

    /// Triangulation failed for a reason other than missing views.
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    /// Error reading or writing file.
    #[error("error reading or writing file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing or writing CSV.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
