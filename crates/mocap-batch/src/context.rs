use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use mocap_post::{ProcessingParams, TrackerKind};
use mocap_volume::CameraArray;

use crate::BatchError;

/// File name of the calibrated camera array inside a workspace.
pub const CAMERA_ARRAY_FILE: &str = "camera_array.json";

/// Name of the directory holding one subdirectory per trial.
pub const RECORDINGS_DIR: &str = "recordings";

/// Everything a batch run needs, resolved once before the first trial.
#[derive(Debug, Clone)]
pub struct BatchContext {
    workspace: PathBuf,
    camera_array: Arc<CameraArray>,
    tracker: TrackerKind,
    params: ProcessingParams,
    workers: usize,
}

impl BatchContext {
    /// Load the camera array of a workspace and check its layout.
    ///
    /// # Arguments
    ///
    /// * `workspace` - The workspace root directory.
    /// * `tracker` - The tracker used for every trial.
    /// * `params` - Processing parameters applied to every trial.
    pub fn load(
        workspace: impl AsRef<Path>,
        tracker: TrackerKind,
        params: ProcessingParams,
    ) -> Result<Self, BatchError> {
        let workspace = workspace.as_ref().to_path_buf();
        if !workspace.is_dir() {
            return Err(BatchError::MissingWorkspace(workspace));
        }
        let recordings = workspace.join(RECORDINGS_DIR);
        if !recordings.is_dir() {
            return Err(BatchError::MissingRecordings(recordings));
        }

        let camera_array = CameraArray::load_json(workspace.join(CAMERA_ARRAY_FILE))?;
        log::info!("Camera count: {}", camera_array.len());

        Ok(Self::new(workspace, camera_array, tracker, params))
    }

    /// Create a context from an already loaded camera array.
    pub fn new(
        workspace: impl Into<PathBuf>,
        camera_array: CameraArray,
        tracker: TrackerKind,
        params: ProcessingParams,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            camera_array: Arc::new(camera_array),
            tracker,
            params,
            workers: 1,
        }
    }

    /// Set the number of trials processed concurrently.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// The workspace root directory.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The directory holding the trials.
    pub fn recordings_dir(&self) -> PathBuf {
        self.workspace.join(RECORDINGS_DIR)
    }

    /// The shared camera array.
    pub fn camera_array(&self) -> &CameraArray {
        &self.camera_array
    }

    /// The tracker used for every trial.
    pub fn tracker(&self) -> TrackerKind {
        self.tracker
    }

    /// Processing parameters applied to every trial.
    pub fn params(&self) -> &ProcessingParams {
        &self.params
    }

    /// Number of trials processed concurrently.
    pub fn workers(&self) -> usize {
        self.workers
    }
}
