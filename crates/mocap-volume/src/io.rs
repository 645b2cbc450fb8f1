use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::VolumeError;

/// One 2D detection of a calibration point by one camera.
///
/// This is a row of `point_data.csv`:
/// `sync_index,port,point_id,img_x,img_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointObservation {
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Port of the observing camera.
    pub port: u32,
    /// Identity of the point, e.g. a board corner id.
    pub point_id: u32,
    /// Pixel x coordinate.
    pub img_x: f64,
    /// Pixel y coordinate.
    pub img_y: f64,
}

/// Read calibration observations from a `point_data.csv` file.
pub fn read_point_data(path: impl AsRef<Path>) -> Result<Vec<PointObservation>, VolumeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let observations = reader
        .deserialize()
        .collect::<Result<Vec<PointObservation>, _>>()?;
    Ok(observations)
}

/// Write calibration observations to a `point_data.csv` file.
pub fn write_point_data(
    path: impl AsRef<Path>,
    observations: &[PointObservation],
) -> Result<(), VolumeError> {
    let mut writer = csv::Writer::from_path(path)?;
    for observation in observations {
        writer.serialize(observation)?;
    }
    writer.flush()?;
    Ok(())
}

/// Corner coordinates of a calibration board in its own frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDefinition {
    /// Corner position keyed by point id.
    pub corners: BTreeMap<u32, [f64; 3]>,
}

impl BoardDefinition {
    /// Read a board definition from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Corners of a planar chessboard lying in the board's z = 0 plane.
    ///
    /// Ids run row by row over the `columns x rows` inner corners.
    pub fn chessboard(columns: u32, rows: u32, square_size: f64) -> Self {
        let corners = (0..rows)
            .flat_map(|r| (0..columns).map(move |c| (r, c)))
            .map(|(r, c)| {
                (
                    r * columns + c,
                    [c as f64 * square_size, r as f64 * square_size, 0.0],
                )
            })
            .collect();
        Self { corners }
    }
}
