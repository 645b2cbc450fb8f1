use crate::triangulation::TriangulationError;

/// An error type for the capture volume.
#[derive(thiserror::Error, Debug)]
pub enum VolumeError {
    /// The origin transform cannot be inverted.
    #[error("Origin transform is singular (determinant {0:e})")]
    SingularTransform(f64),

    /// The transform is invertible but not a rigid motion.
    #[error("Transform is not rigid: {0}")]
    NonRigidTransform(String),

    /// Point estimates and camera array do not agree with each other.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A port was referenced that is not part of the camera array.
    #[error("Camera {0} is not part of the camera array")]
    UnknownCamera(u32),

    /// Not enough shared point ids to fit a rigid transform.
    #[error("Need at least {required} shared point ids, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences found.
        actual: usize,
    },

    /// The snapshot was written with an unsupported format version.
    #[error("Snapshot format version {found} is not supported (expected {expected})")]
    SnapshotVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Triangulation failed for a reason other than missing views.
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    /// Error reading or writing file.
    #[error("error reading or writing file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing or writing JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error parsing or writing CSV.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error encoding a snapshot.
    #[error("Snapshot encode error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),

    /// Error decoding a snapshot.
    #[error("Snapshot decode error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),
}
