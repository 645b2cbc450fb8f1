use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::PostError;

/// A marker trajectory table in the OpenSim TRC (version 4) layout.
///
/// Rows are frames, columns are markers. Missing samples are written as
/// empty cells.
#[derive(Debug, Clone, PartialEq)]
pub struct TrcTable {
    /// Sampling rate of the rows in Hz.
    pub data_rate: f64,
    /// Label of every marker column.
    pub marker_names: Vec<String>,
    /// Time of every row in seconds.
    pub times: Vec<f64>,
    /// Marker positions of every row, one entry per marker.
    pub rows: Vec<Vec<Option<[f64; 3]>>>,
}

impl TrcTable {
    /// Write the table.
    ///
    /// Frame numbers start at 1 and times are relative to the first row.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), PostError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut w = BufWriter::new(File::create(path)?);

        let num_frames = self.rows.len();
        let num_markers = self.marker_names.len();

        writeln!(w, "PathFileType\t4\t(X/Y/Z)\t{file_name}")?;
        writeln!(
            w,
            "DataRate\tCameraRate\tNumFrames\tNumMarkers\tUnits\tOrigDataRate\tOrigDataStartFrame\tOrigNumFrames"
        )?;
        writeln!(
            w,
            "{rate:.2}\t{rate:.2}\t{num_frames}\t{num_markers}\tm\t{rate:.2}\t1\t{num_frames}",
            rate = self.data_rate
        )?;

        let names = self
            .marker_names
            .iter()
            .map(|n| format!("{n}\t\t"))
            .collect::<String>();
        writeln!(w, "Frame#\tTime\t{names}")?;

        let axes = (1..=num_markers)
            .map(|i| format!("X{i}\tY{i}\tZ{i}"))
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(w, "\t\t{axes}")?;
        writeln!(w)?;

        let t0 = self.times.first().copied().unwrap_or(0.0);
        for (i, (time, row)) in self.times.iter().zip(&self.rows).enumerate() {
            write!(w, "{}\t{:.5}", i + 1, time - t0)?;
            for sample in row {
                match sample {
                    Some([x, y, z]) => write!(w, "\t{x:.6}\t{y:.6}\t{z:.6}")?,
                    None => write!(w, "\t\t\t")?,
                }
            }
            writeln!(w)?;
        }

        w.flush()?;
        Ok(())
    }
}
