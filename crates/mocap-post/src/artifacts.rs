use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{PostError, TrackerKind};

/// One tracked 2D keypoint, a row of `xy_<TRACKER>.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyRecord {
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Port of the camera.
    pub port: u32,
    /// Capture time in seconds.
    pub frame_time: f64,
    /// Identity of the keypoint.
    pub point_id: u32,
    /// Pixel x coordinate.
    pub img_x: f64,
    /// Pixel y coordinate.
    pub img_y: f64,
}

/// One reconstructed 3D sample, a row of `xyz_<TRACKER>.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyzRecord {
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Capture time in seconds.
    pub frame_time: f64,
    /// Identity of the point.
    pub point_id: u32,
    /// World x coordinate.
    pub x: f64,
    /// World y coordinate.
    pub y: f64,
    /// World z coordinate.
    pub z: f64,
}

/// File name of the 2D keypoints.
pub fn xy_file_name(tracker: TrackerKind) -> String {
    format!("xy_{}.csv", tracker.name())
}

/// File name of the 3D trajectories.
pub fn xyz_file_name(tracker: TrackerKind) -> String {
    format!("xyz_{}.csv", tracker.name())
}

/// File name of the TRC export.
pub fn trc_file_name(tracker: TrackerKind) -> String {
    format!("xyz_{}.trc", tracker.name())
}

/// Write records to a CSV file with a header row.
pub fn write_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<(), PostError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read all records of a CSV file with a header row.
pub fn read_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, PostError> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(records)
}
