use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    tracker::{Frame, Keypoint},
    PostError,
};

/// One row of a raw per-camera detection file.
///
/// Rows with empty coordinates mark a frame in which the landmark was not
/// found; they keep the frame (and its time) without adding a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Capture time in seconds.
    pub frame_time: f64,
    /// Identity of the landmark.
    pub point_id: u32,
    /// Pixel x coordinate.
    pub img_x: Option<f64>,
    /// Pixel y coordinate.
    pub img_y: Option<f64>,
    /// Detection confidence.
    pub score: f64,
}

/// Path of the raw detections of one camera inside a recording.
pub fn raw_data_path(recording_path: impl AsRef<Path>, port: u32) -> PathBuf {
    recording_path.as_ref().join(format!("port_{port}.csv"))
}

/// Read the frames of one camera, ordered by sync index.
///
/// # Arguments
///
/// * `path` - The raw detection file of the camera.
/// * `port` - The port the frames are attributed to.
pub fn read_frames(path: impl AsRef<Path>, port: u32) -> Result<Vec<Frame>, PostError> {
    let mut reader = csv::Reader::from_path(path)?;

    let mut frames: BTreeMap<i64, Frame> = BTreeMap::new();
    for row in reader.deserialize() {
        let row: RawDetection = row?;
        let frame = frames.entry(row.sync_index).or_insert_with(|| Frame {
            port,
            sync_index: row.sync_index,
            frame_time: row.frame_time,
            detections: Vec::new(),
        });
        if let (Some(x), Some(y)) = (row.img_x, row.img_y) {
            if x.is_finite() && y.is_finite() {
                frame.detections.push(Keypoint {
                    point_id: row.point_id,
                    img: [x, y],
                    score: row.score,
                });
            }
        }
    }

    Ok(frames.into_values().collect())
}

/// Write raw detections of one camera.
pub fn write_raw_detections(
    path: impl AsRef<Path>,
    detections: &[RawDetection],
) -> Result<(), PostError> {
    let mut writer = csv::Writer::from_path(path)?;
    for detection in detections {
        writer.serialize(detection)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_frames_groups_by_sync_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = raw_data_path(dir.path(), 2);
        std::fs::write(
            &path,
            "sync_index,frame_time,point_id,img_x,img_y,score\n\
             1,0.033,0,10.0,11.0,0.9\n\
             0,0.0,0,12.0,13.0,0.8\n\
             1,0.033,1,14.0,15.0,0.7\n\
             2,0.066,0,,,0.0\n",
        )?;

        let frames = read_frames(&path, 2)?;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].sync_index, 0);
        assert_eq!(frames[1].detections.len(), 2);
        assert!(frames[2].detections.is_empty());
        assert_eq!(frames[2].frame_time, 0.066);
        assert!(frames.iter().all(|f| f.port == 2));
        Ok(())
    }
}
