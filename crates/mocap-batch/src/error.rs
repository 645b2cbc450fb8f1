use std::path::PathBuf;

use mocap_volume::VolumeError;

/// Errors that abort a batch before any trial is processed.
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    /// The workspace directory does not exist.
    #[error("Workspace {} does not exist", .0.display())]
    MissingWorkspace(PathBuf),

    /// The workspace has no recordings directory.
    #[error("Recordings directory {} does not exist", .0.display())]
    MissingRecordings(PathBuf),

    /// The camera array could not be loaded.
    #[error("Failed to load camera array: {0}")]
    CameraArray(#[from] VolumeError),

    /// A worker count of zero was requested.
    #[error("Invalid number of workers: {0}")]
    InvalidWorkerCount(usize),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error reading or writing file.
    #[error("error reading or writing file: {0}")]
    IoError(#[from] std::io::Error),
}
